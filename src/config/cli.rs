//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Local mode (default) - every peer as a task in this process
    Local,
    /// Peer mode - run one rank of a TCP peer group
    Peer,
    /// Launch mode - spawn a TCP peer group of local processes
    Launch,
}

/// coordwork - coordinator / worker / writer work distribution
#[derive(Parser, Debug)]
#[command(name = "coordwork")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: local, peer, or launch
    #[arg(long, value_enum, default_value = "local")]
    pub mode: ExecutionMode,

    /// TOML configuration file (CLI flags take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Group Options ===
    /// Number of peers: 1 coordinator + 1 writer + workers (at least 3)
    #[arg(short = 'n', long)]
    pub size: Option<usize>,

    /// Rank of this process (peer mode only)
    #[arg(short = 'r', long, env = "COORDWORK_RANK")]
    pub rank: Option<usize>,

    /// Comma-separated peer addresses indexed by rank (e.g., "10.0.1.10:9999,10.0.1.11:9999")
    #[arg(long)]
    pub hosts: Option<String>,

    /// File containing peer addresses (one per line, in rank order)
    #[arg(long)]
    pub hosts_file: Option<PathBuf>,

    /// Port appended to host addresses given without one
    #[arg(long, default_value = "9999")]
    pub peer_port: u16,

    /// First port to probe when launching local peer processes
    #[arg(long, default_value = "9999")]
    pub base_port: u16,

    /// Time to wait for all peer links (e.g., 500ms, 10s)
    #[arg(long)]
    pub connect_timeout: Option<String>,

    // === Work Options ===
    /// Number of work items to distribute
    #[arg(short = 'm', long)]
    pub items: Option<usize>,

    /// Value of the first work item
    #[arg(long, allow_negative_numbers = true)]
    pub first_item: Option<i64>,

    /// Largest random offset a worker adds to an item
    #[arg(long)]
    pub max_offset: Option<i64>,

    /// Simulated processing time per item (e.g., 100ms, 5s)
    #[arg(long)]
    pub work_delay: Option<String>,

    /// Seed for reproducible results
    #[arg(long)]
    pub seed: Option<u64>,

    // === Output Options ===
    /// Write a JSON run summary to this file
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Do not print the run summary
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Enable debug logging (same as RUST_LOG=debug)
    #[arg(long)]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    ///
    /// Only checks flag combinations; value checks happen on the merged
    /// configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.hosts.is_some() && self.hosts_file.is_some() {
            anyhow::bail!("can only specify one of --hosts or --hosts-file");
        }

        match self.mode {
            ExecutionMode::Peer => {
                if self.rank.is_none() {
                    anyhow::bail!("peer mode requires --rank");
                }
                if self.hosts.is_none() && self.hosts_file.is_none() && self.config.is_none() {
                    anyhow::bail!("peer mode requires --hosts, --hosts-file, or --config with transport.hosts");
                }
            }
            ExecutionMode::Local | ExecutionMode::Launch => {
                if self.rank.is_some() {
                    anyhow::bail!("--rank is only valid in peer mode");
                }
                if self.hosts.is_some() || self.hosts_file.is_some() {
                    anyhow::bail!("--hosts and --hosts-file are only valid in peer mode");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["coordwork"]).unwrap();
        assert_eq!(cli.mode, ExecutionMode::Local);
        assert_eq!(cli.size, None);
        assert_eq!(cli.base_port, 9999);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_peer_mode_requires_rank() {
        let cli = Cli::try_parse_from(["coordwork", "--mode", "peer", "--hosts", "a:1,b:2,c:3"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from([
            "coordwork", "--mode", "peer", "--rank", "1", "--hosts", "a:1,b:2,c:3",
        ])
        .unwrap();
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_peer_mode_requires_hosts() {
        let cli = Cli::try_parse_from(["coordwork", "--mode", "peer", "--rank", "0"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_rank_rejected_outside_peer_mode() {
        let cli = Cli::try_parse_from(["coordwork", "--rank", "2"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_launch_mode_picks_its_own_hosts() {
        let cli = Cli::try_parse_from(["coordwork", "--mode", "launch", "-n", "5"]).unwrap();
        assert!(cli.validate().is_ok());

        let cli = Cli::try_parse_from(["coordwork", "--mode", "launch", "--hosts", "a:1,b:2,c:3"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_negative_first_item() {
        let cli = Cli::try_parse_from(["coordwork", "--first-item", "-5", "-m", "3"]).unwrap();
        assert_eq!(cli.first_item, Some(-5));
        assert_eq!(cli.items, Some(3));
    }
}
