//! Configuration validation

use super::Config;
use crate::echo::RECORD_HEADER_LEN;

/// Largest echo payload that fits in one ICMP datagram alongside the
/// IP and ICMP headers
const MAX_PAYLOAD: usize = 65500;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();
    let ping = &config.ping;

    if ping.count == 0 {
        result.error("ping.count: must be at least 1");
    }

    if ping.timeout_ms == 0 {
        result.error("ping.timeout_ms: zero timeout can never collect a reply");
    }

    if ping.interval_ms == 0 {
        result.warn("ping.interval_ms: zero interval sends requests back to back");
    }

    if ping.payload_size > MAX_PAYLOAD {
        result.error(format!(
            "ping.payload_size: {} exceeds the {} byte ICMP datagram limit",
            ping.payload_size, MAX_PAYLOAD
        ));
    }

    if ping.buffer_size < RECORD_HEADER_LEN + ping.payload_size {
        result.error(format!(
            "ping.buffer_size: {} cannot hold a single reply record for a {} byte payload",
            ping.buffer_size, ping.payload_size
        ));
    }

    if ping.ttl == Some(0) {
        result.error("ping.ttl: zero TTL cannot leave the host");
    }

    if let Some(ref source) = ping.source {
        if source.parse::<std::net::Ipv4Addr>().is_err() {
            result.error(format!("ping.source: '{}' is not an IPv4 address", source));
        }
    }

    result
}
