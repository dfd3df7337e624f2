//! Wire-format parsing and construction
//!
//! IPv4 and ICMP are handled from scratch; headers are read through
//! zero-copy views over the received bytes.

pub mod icmp;
pub mod ipv4;
