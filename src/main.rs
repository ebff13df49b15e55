//! coordwork CLI entry point

use anyhow::{Context, Result};
use coordwork::bootstrap;
use coordwork::config::cli::{Cli, ExecutionMode};
use coordwork::config::toml::{load_config, to_toml_string};
use coordwork::config::validator::{validate_config, validate_rank};
use coordwork::config::Config;
use coordwork::output::{json, text, RunSummary};
use coordwork::protocol::{Rank, Role};
use std::path::Path;
use std::process::{Child, Command};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.validate()?;

    init_tracing(cli.debug);

    let config = load_config(&cli)?;
    validate_config(&config)
        .context("Configuration validation failed")?;

    match cli.mode {
        ExecutionMode::Local => run_local(&cli, config),
        ExecutionMode::Peer => run_peer(&cli, config),
        ExecutionMode::Launch => run_launch(&cli, config),
    }
}

/// Diagnostics go to stderr; `--debug` wins over RUST_LOG
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_banner(config: &Config) {
    println!("coordwork v{}", env!("CARGO_PKG_VERSION"));
    println!("Coordinator / worker / writer work distribution");
    println!();
    print!("{}", config);
}

/// Run the whole group in this process
fn run_local(cli: &Cli, config: Config) -> Result<()> {
    print_banner(&config);

    if cli.dry_run {
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }
    println!();

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    let start = Instant::now();
    let reports = runtime.block_on(bootstrap::run_local_group(&config))?;
    let elapsed = start.elapsed();

    let summary = RunSummary::new("local", config.group.size, None, elapsed, &config.work, reports);
    finish(&config, &summary, config.output.json_output.as_deref())
}

/// Run one rank of a TCP group
fn run_peer(cli: &Cli, config: Config) -> Result<()> {
    let rank = cli.rank.context("peer mode requires --rank")?;
    validate_rank(&config, rank)?;

    println!(
        "coordwork v{}: peer {} of {} ({})",
        env!("CARGO_PKG_VERSION"),
        rank,
        config.group.size,
        Role::for_rank(rank)
    );

    if cli.dry_run {
        print!("{}", config);
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    let start = Instant::now();
    let report = runtime.block_on(bootstrap::run_peer(&config, rank))?;
    let elapsed = start.elapsed();

    let summary = RunSummary::new("peer", config.group.size, Some(rank), elapsed, &config.work, vec![report]);
    let json_path = config
        .output
        .json_output
        .as_deref()
        .map(|path| json::rank_path(path, rank));
    finish(&config, &summary, json_path.as_deref())
}

fn finish(config: &Config, summary: &RunSummary, json_path: Option<&Path>) -> Result<()> {
    if !config.output.quiet {
        println!();
        text::print_summary(summary);
    }

    if let Some(path) = json_path {
        json::write_summary(path, summary)?;
        println!("JSON summary written to {}", path.display());
    }

    Ok(())
}

/// Start a TCP group of local peer processes and wait for all of them
fn run_launch(cli: &Cli, mut config: Config) -> Result<()> {
    let size = config.group.size;
    let ports = find_available_ports(cli.base_port, size)?;
    config.transport.hosts = ports.iter().map(|port| format!("127.0.0.1:{}", port)).collect();
    validate_config(&config)
        .context("Launch configuration validation failed")?;

    print_banner(&config);

    if cli.dry_run {
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }
    println!();

    // Every peer reads the same configuration, so they agree on the host list
    let config_path = std::env::temp_dir().join(format!("coordwork_launch_{}.toml", std::process::id()));
    std::fs::write(&config_path, to_toml_string(&config)?)
        .with_context(|| format!("Failed to write launch config: {}", config_path.display()))?;

    let result = launch_peers(&config_path, size, cli.debug).and_then(wait_for_peers);

    if let Err(e) = std::fs::remove_file(&config_path) {
        warn!(path = %config_path.display(), error = %e, "failed to remove launch config");
    }

    result
}

fn find_available_ports(base_port: u16, count: usize) -> Result<Vec<u16>> {
    use std::net::TcpListener;

    // Hold every listener until the set is complete so no port is picked twice
    let mut listeners = Vec::with_capacity(count);
    for port in base_port..=u16::MAX {
        if listeners.len() == count {
            break;
        }
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
            debug!(port, "port is available");
            listeners.push((port, listener));
        }
    }

    if listeners.len() < count {
        anyhow::bail!(
            "Only {} of {} ports available from {}. Choose another --base-port.",
            listeners.len(),
            count,
            base_port
        );
    }

    Ok(listeners.into_iter().map(|(port, _)| port).collect())
}

fn launch_peers(config_path: &Path, size: usize, debug: bool) -> Result<Vec<(Rank, Child)>> {
    let exe_path = std::env::current_exe()
        .context("Failed to get current executable path")?;

    let mut children = Vec::with_capacity(size);
    for rank in 0..size {
        let mut cmd = Command::new(&exe_path);
        cmd.arg("--mode").arg("peer");
        cmd.arg("--rank").arg(rank.to_string());
        cmd.arg("--config").arg(config_path);
        if debug {
            cmd.arg("--debug");
        }

        match cmd.spawn() {
            Ok(child) => {
                debug!(rank, pid = child.id(), "peer launched");
                children.push((rank, child));
            }
            Err(e) => {
                kill_all(&mut children);
                return Err(e).with_context(|| format!("Failed to spawn peer process for rank {}", rank));
            }
        }
    }

    Ok(children)
}

/// Poll the peers until all exit; the first failure kills the rest
fn wait_for_peers(mut children: Vec<(Rank, Child)>) -> Result<()> {
    loop {
        let mut running = 0;
        let mut failed = None;
        for (rank, child) in children.iter_mut() {
            match child.try_wait() {
                Ok(Some(status)) if !status.success() => {
                    failed = Some(anyhow::anyhow!("Peer {} exited with {}", rank, status));
                    break;
                }
                Ok(Some(_)) => {}
                Ok(None) => running += 1,
                Err(e) => {
                    failed = Some(anyhow::Error::new(e).context(format!("Failed to poll peer {}", rank)));
                    break;
                }
            }
        }

        if let Some(e) = failed {
            kill_all(&mut children);
            return Err(e);
        }
        if running == 0 {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn kill_all(children: &mut [(Rank, Child)]) {
    for (rank, child) in children.iter_mut() {
        if let Ok(Some(_)) = child.try_wait() {
            continue;
        }
        if let Err(e) = child.kill() {
            warn!(rank = *rank, error = %e, "failed to kill peer");
            continue;
        }
        if let Ok(status) = child.wait() {
            debug!(rank = *rank, %status, "peer killed");
        }
    }
}
