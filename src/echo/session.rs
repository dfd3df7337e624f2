//! Echo session orchestration
//!
//! Drives one conversation: build -> send -> (poll/classify/accumulate)* ->
//! finalize, under a shrinking wall-clock budget.

use crate::echo::accumulate::{Replies, ReplyAccumulator};
use crate::echo::classify::{classify, Classification};
use crate::echo::transport::IcmpTransport;
use crate::protocol::icmp::{build_echo_request, ICMP_HEADER_SIZE};
use crate::protocol::ipv4::MAX_HEADER_SIZE;
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Process-wide sequence counter shared by all sessions.
///
/// Incremented with an atomic fetch-add; never reset. 16-bit wraparound is
/// intentional: uniqueness is only needed among concurrently in-flight
/// requests, not across all time.
static SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// Draw the next echo sequence number
pub fn next_sequence() -> u16 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Per-call session parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub destination: Ipv4Addr,
    pub source: Option<Ipv4Addr>,
    pub payload: Vec<u8>,
    pub ttl: Option<u8>,
    pub tos: Option<u8>,
    /// Capacity of the packed reply buffer, in bytes
    pub reply_capacity: usize,
    pub timeout: Duration,
}

impl SessionConfig {
    pub fn new(destination: Ipv4Addr) -> Self {
        Self {
            destination,
            source: None,
            payload: Vec::new(),
            ttl: None,
            tos: None,
            reply_capacity: 4096,
            timeout: Duration::from_secs(4),
        }
    }
}

/// Remaining-timeout budget for the receive loop
///
/// Decreased by observed wall-clock deltas whether or not the received
/// packet was relevant; saturates at zero.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    remaining: Duration,
}

impl Budget {
    pub fn new(timeout: Duration) -> Self {
        Self { remaining: timeout }
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_zero()
    }

    pub fn consume(&mut self, elapsed: Duration) {
        self.remaining = self.remaining.saturating_sub(elapsed);
    }

    /// Force the budget to zero so the next poll is a non-blocking drain
    pub fn exhaust(&mut self) {
        self.remaining = Duration::ZERO;
    }
}

/// One blocking echo conversation
pub struct EchoSession {
    config: SessionConfig,
    metrics: Arc<MetricsRegistry>,
}

impl EchoSession {
    pub fn new(config: SessionConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self { config, metrics }
    }

    /// Send one echo request and collect replies until the buffer fills or
    /// the budget runs out
    ///
    /// Returns the packed replies, or `TimedOut` when nothing matched
    /// within the budget. The scratch buffer and socket are owned by this
    /// call frame and released on every exit path.
    pub fn run(&self) -> Result<Replies> {
        if self.config.destination.is_unspecified() {
            return Err(Error::InvalidDestination);
        }

        let id = (std::process::id() & 0xFFFF) as u16;
        let sequence = next_sequence();
        let packet = build_echo_request(id, sequence, &self.config.payload)?;

        let mut transport = IcmpTransport::open()?;
        if let Some(source) = self.config.source {
            transport.bind_source(source)?;
        }
        transport.apply_options(self.config.ttl, self.config.tos)?;

        let scratch_len = scratch_size(self.config.reply_capacity);
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(scratch_len)
            .map_err(|_| Error::Allocation(scratch_len))?;
        scratch.resize(scratch_len, 0);

        let mut accumulator = ReplyAccumulator::new(self.config.reply_capacity)?;

        let sent_at = match transport.send(self.config.destination, &packet) {
            Ok(t) => t,
            Err(e) => {
                self.metrics.send_errors.inc();
                return Err(e);
            }
        };
        self.metrics.echo_requests_sent.inc();
        debug!(
            dest = %self.config.destination,
            id,
            sequence,
            bytes = packet.len(),
            mode = ?transport.mode(),
            "echo request sent"
        );

        let mut budget = Budget::new(self.config.timeout);
        loop {
            let wait_started = Instant::now();
            let Some((len, from, received_at)) =
                transport.poll_recv(budget.remaining(), &mut scratch)?
            else {
                trace!("receive budget exhausted");
                break;
            };
            budget.consume(received_at.saturating_duration_since(wait_started));

            match classify(&scratch[..len], from, id, sequence, sent_at, received_at) {
                Classification::Irrelevant => {
                    self.metrics.packets_ignored.inc();
                    trace!(bytes = len, %from, "ignoring unrelated datagram");
                }
                Classification::Matched(reply) => {
                    self.metrics.replies_matched.inc();
                    debug!(
                        source = %reply.source,
                        status = %reply.status,
                        rtt_us = reply.rtt.as_micros() as u64,
                        "reply matched"
                    );
                    if accumulator.add(&reply).is_err() {
                        debug!("reply buffer full, stopping receive loop");
                        break;
                    }
                    // One more non-blocking pass to drain already-queued
                    // replies without waiting further.
                    budget.exhaust();
                }
            }
        }

        let replies = accumulator.finalize();
        if replies.is_empty() {
            self.metrics.timeouts.inc();
            debug!(dest = %self.config.destination, sequence, "timed out with no replies");
            return Err(Error::TimedOut);
        }
        Ok(replies)
    }
}

/// Scratch sizing: worst-case IP header + ICMP header + bounded payload,
/// one allocation reused for every inbound datagram
fn scratch_size(reply_capacity: usize) -> usize {
    MAX_HEADER_SIZE + ICMP_HEADER_SIZE + reply_capacity.min(65535)
}
