//! TOML configuration file parsing
//!
//! ```toml
//! [group]
//! size = 6
//!
//! [work]
//! items = 100
//! max_offset = 100
//! work_delay_ms = 5000
//!
//! [transport]
//! hosts = ["10.0.1.10:9999", "10.0.1.11:9999", "10.0.1.12:9999"]
//! ```

use super::cli::Cli;
use super::cli_convert::{parse_duration_ms, parse_host_list, parse_hosts_file};
use super::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
///
/// A file that lists hosts but no `[group] size` takes its size from the host
/// list. An explicit size is kept as written, so a mismatch reaches validation.
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let raw: ::toml::Table = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;
    let size_given = raw
        .get("group")
        .and_then(|group| group.get("size"))
        .is_some();

    let mut config: Config = ::toml::Value::Table(raw).try_into()
        .context("Failed to parse TOML configuration")?;

    if !size_given && !config.transport.hosts.is_empty() {
        config.group.size = config.transport.hosts.len();
    }

    Ok(config)
}

/// Render a configuration as TOML
pub fn to_toml_string(config: &Config) -> Result<String> {
    ::toml::to_string(config).context("Failed to serialize configuration to TOML")
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Override transport settings
    if let Some(ref list) = cli.hosts {
        config.transport.hosts = parse_host_list(list, cli.peer_port);
    } else if let Some(ref path) = cli.hosts_file {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read hosts file: {}", path.display()))?;
        config.transport.hosts = parse_hosts_file(&content, cli.peer_port);
    }
    if let Some(ref timeout_str) = cli.connect_timeout {
        config.transport.connect_timeout_ms = parse_duration_ms(timeout_str)
            .context("Invalid connect timeout")?;
    }

    // Group size: explicit flag, else implied by a host list given on the
    // command line; a size from the file was settled when it was parsed
    if let Some(size) = cli.size {
        config.group.size = size;
    } else if cli.hosts.is_some() || cli.hosts_file.is_some() {
        config.group.size = config.transport.hosts.len();
    }

    // Override work settings
    if let Some(items) = cli.items {
        config.work.items = items;
    }
    if let Some(first_item) = cli.first_item {
        config.work.first_item = first_item;
    }
    if let Some(max_offset) = cli.max_offset {
        config.work.max_offset = max_offset;
    }
    if let Some(ref delay_str) = cli.work_delay {
        config.work.work_delay_ms = parse_duration_ms(delay_str)
            .context("Invalid work delay")?;
    }
    if cli.seed.is_some() {
        config.work.seed = cli.seed;
    }

    // Override output settings
    if let Some(ref path) = cli.json_output {
        config.output.json_output = Some(path.clone());
    }
    if cli.quiet {
        config.output.quiet = true;
    }

    Ok(config)
}

/// Build the effective configuration: defaults, then TOML file, then CLI
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => Config::default(),
    };

    merge_cli_with_config(cli, base)
}
