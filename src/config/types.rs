//! Configuration types

use serde::Deserialize;

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ping: PingConfig,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    /// Number of echo requests per invocation
    pub count: u32,
    /// Delay between requests, milliseconds
    pub interval_ms: u64,
    /// Per-request timeout budget, milliseconds
    pub timeout_ms: u64,
    /// Echo payload size, bytes
    pub payload_size: usize,
    /// Reply buffer capacity, bytes
    pub buffer_size: usize,
    pub ttl: Option<u8>,
    pub tos: Option<u8>,
    /// Source address to bind before sending
    pub source: Option<String>,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: 4,
            interval_ms: 1000,
            timeout_ms: 4000,
            payload_size: 32,
            buffer_size: 4096,
            ttl: None,
            tos: None,
            source: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
    /// Output format: pretty, compact, json
    pub format: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ping.count, 4);
        assert_eq!(config.ping.timeout_ms, 4000);
        assert_eq!(config.ping.payload_size, 32);
        assert_eq!(config.ping.buffer_size, 4096);
        assert!(config.ping.ttl.is_none());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [ping]
            count = 1
            timeout_ms = 250

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.ping.count, 1);
        assert_eq!(config.ping.timeout_ms, 250);
        // Unspecified fields keep their defaults
        assert_eq!(config.ping.payload_size, 32);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "pretty");
    }

    #[test]
    fn test_parse_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.ping.count, 4);
    }
}
