//! Configuration validation

use super::*;
use crate::protocol::{self, Rank, MIN_GROUP_SIZE};
use anyhow::Result;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_group(&config.group)?;
    validate_work(&config.work)?;
    validate_transport(&config.transport, &config.group)?;

    Ok(())
}

/// Validate peer group shape
pub fn validate_group(group: &GroupConfig) -> Result<()> {
    if group.size < MIN_GROUP_SIZE {
        anyhow::bail!(
            "group size must be at least {} (coordinator, writer, and one worker), got {}",
            MIN_GROUP_SIZE,
            group.size
        );
    }
    Ok(())
}

/// Validate work settings
pub fn validate_work(work: &WorkConfig) -> Result<()> {
    if work.max_offset < 0 {
        anyhow::bail!("max_offset must not be negative, got {}", work.max_offset);
    }
    if i64::try_from(work.items).ok().and_then(|n| work.first_item.checked_add(n)).is_none() {
        anyhow::bail!(
            "work items {}..+{} overflow the item range",
            work.first_item,
            work.items
        );
    }
    Ok(())
}

/// Validate TCP transport settings
///
/// An empty host list is fine for local mode; peer mode checks for it
/// separately in `validate_rank`.
pub fn validate_transport(transport: &TransportConfig, group: &GroupConfig) -> Result<()> {
    if transport.hosts.is_empty() {
        return Ok(());
    }

    if transport.hosts.len() != group.size {
        anyhow::bail!(
            "host list has {} entries but group size is {}",
            transport.hosts.len(),
            group.size
        );
    }

    for (rank, host) in transport.hosts.iter().enumerate() {
        let port_ok = host
            .rsplit_once(':')
            .is_some_and(|(name, port)| !name.is_empty() && port.parse::<u16>().is_ok());
        if !port_ok {
            anyhow::bail!("host for rank {} must be host:port, got '{}'", rank, host);
        }
    }

    if transport.connect_timeout_ms == 0 {
        anyhow::bail!("connect_timeout must be greater than zero");
    }

    Ok(())
}

/// Validate the rank of a peer process against the configuration
pub fn validate_rank(config: &Config, rank: Rank) -> Result<()> {
    if config.transport.hosts.is_empty() {
        anyhow::bail!("peer mode requires a host list");
    }
    if rank >= config.transport.hosts.len() {
        return Err(protocol::ProtocolError::RankOutOfRange {
            rank,
            size: config.transport.hosts.len(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_group_needs_a_worker() {
        let mut config = Config::default();
        config.group.size = 2;
        assert!(validate_config(&config).is_err());

        config.group.size = 3;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_negative_offset_rejected() {
        let mut config = Config::default();
        config.work.max_offset = -1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_item_overflow_rejected() {
        let mut config = Config::default();
        config.work.first_item = i64::MAX - 1;
        config.work.items = 5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_host_count_must_match() {
        let mut config = Config::default();
        config.transport.hosts = vec!["a:1".into(), "b:2".into(), "c:3".into()];
        assert!(validate_config(&config).is_err());

        config.group.size = 3;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_host_needs_port() {
        let mut config = Config::default();
        config.group.size = 3;
        config.transport.hosts = vec!["a:1".into(), "b".into(), "c:3".into()];
        assert!(validate_config(&config).is_err());

        config.transport.hosts = vec!["a:1".into(), ":2".into(), "c:3".into()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rank() {
        let mut config = Config::default();
        assert!(validate_rank(&config, 0).is_err());

        config.group.size = 3;
        config.transport.hosts = vec!["a:1".into(), "b:2".into(), "c:3".into()];
        assert!(validate_rank(&config, 2).is_ok());
        assert!(validate_rank(&config, 3).is_err());
    }
}
