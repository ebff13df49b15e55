//! Conversion of CLI strings into configuration values

use anyhow::{Context, Result};

/// Parse a duration string into milliseconds
///
/// Accepts `ms`, `s`, `m` and `h` suffixes; a bare number is milliseconds.
pub fn parse_duration_ms(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60 * 1000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60 * 1000)
    } else {
        (s.as_str(), 1)
    };

    let value: u64 = num_str.trim().parse()
        .with_context(|| format!("Invalid duration: {}", s))?;

    value.checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("Duration too large: {}", s))
}

/// Add `default_port` to an address that has none
fn with_port(addr: &str, default_port: u16) -> String {
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, default_port)
    }
}

/// Parse a comma-separated list of peer addresses
pub fn parse_host_list(list: &str, default_port: u16) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(|addr| with_port(addr, default_port))
        .collect()
}

/// Parse the contents of a hosts file (one address per line, `#` comments)
pub fn parse_hosts_file(content: &str, default_port: u16) -> Vec<String> {
    content.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|addr| with_port(addr, default_port))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_ms() {
        assert_eq!(parse_duration_ms("250ms").unwrap(), 250);
        assert_eq!(parse_duration_ms("5s").unwrap(), 5000);
        assert_eq!(parse_duration_ms("2m").unwrap(), 120_000);
        assert_eq!(parse_duration_ms("1h").unwrap(), 3_600_000);
        assert_eq!(parse_duration_ms("40").unwrap(), 40);
        assert_eq!(parse_duration_ms(" 10S ").unwrap(), 10_000);
        assert!(parse_duration_ms("fast").is_err());
        assert!(parse_duration_ms("-1s").is_err());
    }

    #[test]
    fn test_parse_host_list() {
        let hosts = parse_host_list("10.0.1.10:7000, node-b,,node-c:7002", 9999);
        assert_eq!(hosts, vec!["10.0.1.10:7000", "node-b:9999", "node-c:7002"]);
    }

    #[test]
    fn test_parse_hosts_file() {
        let content = "# rank order matters\nnode-a:7000\n\nnode-b\n  # trailing comment\nnode-c:7002\n";
        let hosts = parse_hosts_file(content, 9999);
        assert_eq!(hosts, vec!["node-a:7000", "node-b:9999", "node-c:7002"]);
    }
}
