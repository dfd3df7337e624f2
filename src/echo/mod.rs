//! The echo engine
//!
//! One call = one in-flight conversation: build an echo request, send it,
//! then classify and accumulate inbound datagrams under a shrinking timeout
//! budget. Sessions on different threads share nothing but the process-wide
//! sequence counter.

mod accumulate;
mod classify;
mod reply;
mod session;
mod transport;

pub use accumulate::{BufferFull, Replies, Reply, ReplyAccumulator, RECORD_HEADER_LEN};
pub use classify::{classify, classify_strict, Classification, Matched};
pub use reply::{IpOptionInfo, ReplyStatus};
pub use session::{next_sequence, Budget, EchoSession, SessionConfig};
pub use transport::{IcmpTransport, SocketMode};
