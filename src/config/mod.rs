//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! CLI flags override values loaded from a TOML file, which override the
//! defaults below.

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default)]
    pub work: WorkConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Peer group shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Number of peers: coordinator + writer + workers
    #[serde(default = "default_group_size")]
    pub size: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            size: default_group_size(),
        }
    }
}

fn default_group_size() -> usize {
    4
}

/// Work stream and work function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkConfig {
    /// Number of work items in the stream
    #[serde(default = "default_items")]
    pub items: usize,
    /// Value of the first work item
    #[serde(default)]
    pub first_item: i64,
    /// Upper bound (inclusive) of the random offset added by workers
    #[serde(default = "default_max_offset")]
    pub max_offset: i64,
    /// Simulated processing time per item (milliseconds)
    #[serde(default)]
    pub work_delay_ms: u64,
    /// Seed for reproducible results (per worker: seed + rank)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl WorkConfig {
    /// Work items, in dispatch order
    pub fn items(&self) -> Range<i64> {
        let count = i64::try_from(self.items).unwrap_or(i64::MAX);
        self.first_item..self.first_item.saturating_add(count)
    }

    pub fn work_delay(&self) -> Duration {
        Duration::from_millis(self.work_delay_ms)
    }
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            items: default_items(),
            first_item: 0,
            max_offset: default_max_offset(),
            work_delay_ms: 0,
            seed: None,
        }
    }
}

fn default_items() -> usize {
    100
}

fn default_max_offset() -> i64 {
    100
}

/// TCP group settings (peer and launch modes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// `host:port` of every rank, indexed by rank
    #[serde(default)]
    pub hosts: Vec<String>,
    /// How long to wait for the mesh to come up (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write a JSON run summary to this path
    pub json_output: Option<PathBuf>,
    /// Skip the console run summary
    #[serde(default)]
    pub quiet: bool,
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration:")?;
        writeln!(
            f,
            "  Group size: {} (1 coordinator, 1 writer, {} workers)",
            self.group.size,
            crate::protocol::worker_count(self.group.size)
        )?;
        let items = self.work.items();
        writeln!(f, "  Work items: {} ({}..{})", self.work.items, items.start, items.end)?;
        writeln!(f, "  Result offset: 0..={}", self.work.max_offset)?;
        if self.work.work_delay_ms > 0 {
            writeln!(f, "  Work delay: {}ms", self.work.work_delay_ms)?;
        }
        if let Some(seed) = self.work.seed {
            writeln!(f, "  Seed: {}", seed)?;
        }
        if !self.transport.hosts.is_empty() {
            writeln!(f, "  Hosts: {}", self.transport.hosts.join(","))?;
        }
        if let Some(ref path) = self.output.json_output {
            writeln!(f, "  JSON output: {}", path.display())?;
        }
        Ok(())
    }
}
