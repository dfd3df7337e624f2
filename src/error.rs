use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("permission denied: neither raw nor datagram ICMP socket available")]
    PermissionDenied,

    #[error("failed to allocate {0} bytes")]
    Allocation(usize),

    #[error("destination address missing or invalid")]
    InvalidDestination,

    #[error("packet too big for the network path")]
    PacketTooBig,

    #[error("destination network unreachable")]
    NetUnreachable,

    #[error("destination host unreachable")]
    HostUnreachable,

    #[error("request timed out")]
    TimedOut,

    #[error("send failed: {0}")]
    SendFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
