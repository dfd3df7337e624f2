//! rping - ICMP Echo engine
//!
//! A synchronous "ping" engine: builds ICMP echo requests, sends them over a
//! raw (or unprivileged datagram) socket, classifies inbound datagrams
//! including ICMP error responses correlated to the original request, and
//! packs reply records into a caller-sized buffer under a wall-clock timeout
//! budget.

pub mod config;
pub mod echo;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
