//! Reply accumulation and buffer packing
//!
//! Replies are packed into a single caller-sized buffer: a fixed-size array
//! of encoded record headers at the front, variable-length payload and
//! option bytes behind it. While the receive loop runs, payload bytes are
//! written back-to-front from the end of the buffer and record positions
//! are tracked as (offset, length) pairs; `finalize` closes the gap between
//! the header array and the payload block in one move and rebases every
//! offset once. No record ever points into the header-array region.

use crate::echo::classify::Matched;
use crate::echo::reply::{IpOptionInfo, ReplyStatus};
use crate::{Error, Result};
use std::net::Ipv4Addr;
use std::ops::Range;
use std::time::Duration;

/// Encoded size of one reply record header
pub const RECORD_HEADER_LEN: usize = 28;

/// Size of the optional legacy status trailer
pub const STATUS_TRAILER_LEN: usize = 8;

/// The reply buffer cannot fit another record; a normal termination
/// condition for the receive loop, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull;

#[derive(Debug, Clone, Copy)]
struct Slot {
    source: Ipv4Addr,
    status: ReplyStatus,
    rtt_ms: u32,
    options: IpOptionInfo,
    data_off: usize,
    data_len: usize,
    opts_off: usize,
    opts_len: usize,
}

/// Packs classified replies into a caller-sized buffer
pub struct ReplyAccumulator {
    buf: Vec<u8>,
    /// Start of the payload region written so far (grows downward)
    tail: usize,
    slots: Vec<Slot>,
}

impl ReplyAccumulator {
    pub fn new(capacity: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| Error::Allocation(capacity))?;
        buf.resize(capacity, 0);
        Ok(Self {
            tail: capacity,
            buf,
            slots: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append one reply, copying its payload and option bytes out of the
    /// scratch buffer
    ///
    /// The capacity check accounts for the grown header array plus the
    /// incoming bytes; once it fails the loop should stop accepting packets.
    pub fn add(&mut self, reply: &Matched<'_>) -> std::result::Result<(), BufferFull> {
        let incoming = reply.data.len() + reply.raw_options.len();
        let header_need = (self.slots.len() + 1) * RECORD_HEADER_LEN;
        let payload_used = self.buf.len() - self.tail;
        if header_need + payload_used + incoming > self.buf.len() {
            return Err(BufferFull);
        }

        let data_off = self.tail - reply.data.len();
        self.buf[data_off..self.tail].copy_from_slice(reply.data);
        let opts_off = data_off - reply.raw_options.len();
        self.buf[opts_off..data_off].copy_from_slice(reply.raw_options);
        self.tail = opts_off;

        self.slots.push(Slot {
            source: reply.source,
            status: reply.status,
            rtt_ms: reply.rtt.as_millis().min(u32::MAX as u128) as u32,
            options: reply.options,
            data_off,
            data_len: reply.data.len(),
            opts_off,
            opts_len: reply.raw_options.len(),
        });
        Ok(())
    }

    /// Close the gap between the header array and the payload block,
    /// materialize record offsets, and encode the header array
    ///
    /// Called exactly once, after the receive loop ends.
    pub fn finalize(mut self) -> Replies {
        let capacity = self.buf.len();
        let header_end = self.slots.len() * RECORD_HEADER_LEN;
        let gap = self.tail - header_end;

        if gap > 0 && self.tail < capacity {
            self.buf.copy_within(self.tail..capacity, header_end);
        }
        for slot in &mut self.slots {
            slot.data_off -= gap;
            slot.opts_off -= gap;
        }

        let used = header_end + (capacity - self.tail);
        for (i, slot) in self.slots.iter().enumerate() {
            encode_record(
                &mut self.buf[i * RECORD_HEADER_LEN..(i + 1) * RECORD_HEADER_LEN],
                slot,
            );
        }

        // Legacy callers expect a status trailer after the packed records
        // when the buffer has room for one.
        let trailer = capacity - used >= STATUS_TRAILER_LEN;
        if trailer {
            let status = if self.slots.is_empty() {
                ReplyStatus::TimedOut
            } else {
                ReplyStatus::Success
            };
            self.buf[used..used + 4].copy_from_slice(&status.as_u32().to_le_bytes());
            self.buf[used + 4..used + 8].copy_from_slice(&(used as u32).to_le_bytes());
        }

        Replies {
            buf: self.buf,
            count: self.slots.len(),
            used,
            trailer,
        }
    }
}

fn encode_record(out: &mut [u8], slot: &Slot) {
    out[0..4].copy_from_slice(&slot.source.octets());
    out[4..8].copy_from_slice(&slot.status.as_u32().to_le_bytes());
    out[8..12].copy_from_slice(&slot.rtt_ms.to_le_bytes());
    out[12..14].copy_from_slice(&(slot.data_len as u16).to_le_bytes());
    out[14..16].copy_from_slice(&(slot.opts_len as u16).to_le_bytes());
    out[16..20].copy_from_slice(&(slot.data_off as u32).to_le_bytes());
    out[20..24].copy_from_slice(&(slot.opts_off as u32).to_le_bytes());
    out[24] = slot.options.ttl;
    out[25] = slot.options.tos;
    out[26] = slot.options.flags;
    out[27] = 0;
}

/// Finalized reply set, owning the packed buffer
#[derive(Debug)]
pub struct Replies {
    buf: Vec<u8>,
    count: usize,
    used: usize,
    trailer: bool,
}

impl Replies {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes of the buffer occupied by headers + payload
    pub fn bytes_used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn has_status_trailer(&self) -> bool {
        self.trailer
    }

    /// The packed caller-buffer bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn get(&self, index: usize) -> Option<Reply<'_>> {
        if index >= self.count {
            return None;
        }
        let header = &self.buf[index * RECORD_HEADER_LEN..(index + 1) * RECORD_HEADER_LEN];
        let data_len = u16::from_le_bytes([header[12], header[13]]) as usize;
        let opts_len = u16::from_le_bytes([header[14], header[15]]) as usize;
        let data_off = u32::from_le_bytes([header[16], header[17], header[18], header[19]]) as usize;
        let opts_off = u32::from_le_bytes([header[20], header[21], header[22], header[23]]) as usize;
        let status_code = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        Some(Reply {
            source: Ipv4Addr::new(header[0], header[1], header[2], header[3]),
            status: ReplyStatus::from_u32(status_code).unwrap_or(ReplyStatus::GeneralFailure),
            rtt: Duration::from_millis(
                u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as u64,
            ),
            options: IpOptionInfo {
                ttl: header[24],
                tos: header[25],
                flags: header[26],
            },
            data: &self.buf[data_off..data_off + data_len],
            raw_options: &self.buf[opts_off..opts_off + opts_len],
            data_range: data_off..data_off + data_len,
            options_range: opts_off..opts_off + opts_len,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Reply<'_>> {
        (0..self.count).filter_map(move |i| self.get(i))
    }
}

/// One decoded reply record
#[derive(Debug)]
pub struct Reply<'a> {
    pub source: Ipv4Addr,
    pub status: ReplyStatus,
    pub rtt: Duration,
    pub options: IpOptionInfo,
    data: &'a [u8],
    raw_options: &'a [u8],
    data_range: Range<usize>,
    options_range: Range<usize>,
}

impl<'a> Reply<'a> {
    /// Echoed payload (or the embedded original datagram for error replies)
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Raw IP option bytes from the reply's outer header
    pub fn raw_options(&self) -> &'a [u8] {
        self.raw_options
    }

    /// Position of the payload within the packed buffer
    pub fn data_range(&self) -> Range<usize> {
        self.data_range.clone()
    }

    /// Position of the option bytes within the packed buffer
    pub fn options_range(&self) -> Range<usize> {
        self.options_range.clone()
    }
}
