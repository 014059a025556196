//! Read/write batch queues and the sticky error counter.
//!
//! All register accesses of one control cycle travel in one outbound write
//! datagram, one outbound read-request datagram and one inbound reply. The
//! queues own fixed-capacity buffers so nothing allocates in the cycle.
//!
//! # Read Batch Lifecycle
//!
//! ```text
//! enqueue* ──► flush ──► collect ──► Complete: slots readable until the
//!   (filling)   (in flight)    │                next batch completes
//!                              └──► Discarded: slots unreadable
//! ```

use crate::lbp16::{CommandHeader, Direction};
use anyio_common::consts::{ERROR_CEILING, ERROR_DECAY, HEADER_LEN, MAX_PACKET_SIZE, MAX_QUEUED_READS};
use anyio_common::llio::interface::LlioError;
use anyio_common::llio::types::ReadSlot;
use static_assertions::const_assert;

// Slot offsets and lengths are u16.
const_assert!(MAX_PACKET_SIZE <= u16::MAX as usize);

/// Sticky communication error counter with hysteresis.
///
/// +1 per failed batch up to [`ERROR_CEILING`], -[`ERROR_DECAY`] per good
/// batch down to zero. A single lost packet is absorbed, sustained loss
/// saturates the counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorHysteresis {
    count: u8,
}

impl ErrorHysteresis {
    /// Counter at zero.
    pub const fn new() -> Self {
        Self { count: 0 }
    }

    /// Current value, in `0..=ERROR_CEILING`.
    pub const fn count(&self) -> u8 {
        self.count
    }

    /// True once the counter sits at its ceiling.
    pub const fn is_saturated(&self) -> bool {
        self.count >= ERROR_CEILING
    }

    /// Count one failure; returns the new value.
    pub fn record_failure(&mut self) -> u8 {
        self.count = self.count.saturating_add(1).min(ERROR_CEILING);
        self.count
    }

    /// Count one success; returns the new value.
    pub fn record_success(&mut self) -> u8 {
        self.count = self.count.saturating_sub(ERROR_DECAY);
        self.count
    }
}

/// Queued register reads of one batch.
#[derive(Debug)]
pub struct ReadQueue {
    requests: heapless::Vec<u8, MAX_PACKET_SIZE>,
    slots: heapless::Vec<ReadSlot, MAX_QUEUED_READS>,
    reply_len: usize,
    batch: u32,
    in_flight: bool,
    data: heapless::Vec<u8, MAX_PACKET_SIZE>,
    completed: Option<u32>,
}

impl Default for ReadQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadQueue {
    /// Empty queue at batch 0.
    pub const fn new() -> Self {
        Self {
            requests: heapless::Vec::new(),
            slots: heapless::Vec::new(),
            reply_len: 0,
            batch: 0,
            in_flight: false,
            data: heapless::Vec::new(),
            completed: None,
        }
    }

    /// Queue a read of `size` bytes at `address`.
    ///
    /// Returns `None` for `size == 0`.
    ///
    /// # Errors
    /// - `Misaligned` / `TransferTooLarge` for lengths one command cannot carry
    /// - `BatchOverflow` if the request or reply would exceed one datagram or
    ///   the slot table is full
    /// - `BatchInFlight` between flush and collect
    ///
    /// On error the queue is unchanged.
    pub fn enqueue(&mut self, address: u16, size: usize) -> Result<Option<ReadSlot>, LlioError> {
        if size == 0 {
            return Ok(None);
        }
        if self.in_flight {
            return Err(LlioError::BatchInFlight { batch: self.batch });
        }
        let header = CommandHeader::register(Direction::Read, size, address)?;

        let reply_free = MAX_PACKET_SIZE - self.reply_len;
        if size > reply_free {
            return Err(LlioError::BatchOverflow {
                requested: size,
                available: reply_free,
            });
        }
        let request_free = MAX_PACKET_SIZE - self.requests.len();
        if HEADER_LEN > request_free || self.slots.is_full() {
            return Err(LlioError::BatchOverflow {
                requested: HEADER_LEN,
                available: if self.slots.is_full() { 0 } else { request_free },
            });
        }

        let slot = ReadSlot::new(self.batch, self.reply_len as u16, size as u16);
        self.slots
            .push(slot)
            .map_err(|_| LlioError::BatchOverflow {
                requested: HEADER_LEN,
                available: 0,
            })?;
        // Capacity was checked above.
        let _ = self.requests.extend_from_slice(&header.encode());
        self.reply_len += size;
        Ok(Some(slot))
    }

    /// True if no reads are queued.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of queued reads.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Concatenated read-request headers.
    pub fn request_packet(&self) -> &[u8] {
        &self.requests
    }

    /// Length the reply datagram must have.
    pub fn expected_reply_len(&self) -> usize {
        self.reply_len
    }

    /// Sequence number of the batch being filled or in flight.
    pub fn batch(&self) -> u32 {
        self.batch
    }

    /// True between flush and collect.
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Mark the batch as sent.
    pub fn mark_flushed(&mut self) {
        self.in_flight = true;
    }

    /// Accept `reply` for the in-flight batch.
    ///
    /// # Errors
    /// `ShortReply` if the reply length differs from the queued total; the
    /// queue is left untouched so the caller can discard it.
    pub fn complete(&mut self, reply: &[u8]) -> Result<(), LlioError> {
        if reply.len() != self.reply_len {
            return Err(LlioError::ShortReply {
                expected: self.reply_len,
                actual: reply.len(),
            });
        }
        self.data.clear();
        let _ = self.data.extend_from_slice(reply);
        self.completed = Some(self.batch);
        self.advance();
        Ok(())
    }

    /// Drop the current batch; data from the last completed batch becomes
    /// unreadable too.
    pub fn discard(&mut self) {
        self.data.clear();
        self.completed = None;
        self.advance();
    }

    fn advance(&mut self) {
        self.requests.clear();
        self.slots.clear();
        self.reply_len = 0;
        self.in_flight = false;
        self.batch = self.batch.wrapping_add(1);
    }

    /// Bytes for `slot` if its batch is the last completed one.
    pub fn slot(&self, slot: ReadSlot) -> Option<&[u8]> {
        if self.completed != Some(slot.batch()) {
            return None;
        }
        self.data.get(slot.range())
    }
}

/// Queued register writes of one batch.
#[derive(Debug, Default)]
pub struct WriteQueue {
    packet: heapless::Vec<u8, MAX_PACKET_SIZE>,
    count: usize,
}

impl WriteQueue {
    /// Empty queue.
    pub const fn new() -> Self {
        Self {
            packet: heapless::Vec::new(),
            count: 0,
        }
    }

    /// Append a write command carrying a copy of `data`.
    ///
    /// Empty `data` is a no-op.
    ///
    /// # Errors
    /// - `Misaligned` / `TransferTooLarge` for lengths one command cannot carry
    /// - `BatchOverflow` if header plus payload do not fit; the queue is
    ///   unchanged
    pub fn enqueue(&mut self, address: u16, data: &[u8]) -> Result<(), LlioError> {
        if data.is_empty() {
            return Ok(());
        }
        let header = CommandHeader::register(Direction::Write, data.len(), address)?;
        let needed = HEADER_LEN + data.len();
        let available = MAX_PACKET_SIZE - self.packet.len();
        if needed > available {
            return Err(LlioError::BatchOverflow {
                requested: needed,
                available,
            });
        }
        let _ = self.packet.extend_from_slice(&header.encode());
        let _ = self.packet.extend_from_slice(data);
        self.count += 1;
        Ok(())
    }

    /// True if no writes are queued.
    pub fn is_empty(&self) -> bool {
        self.packet.is_empty()
    }

    /// Number of queued writes.
    pub fn len(&self) -> usize {
        self.count
    }

    /// The outbound datagram.
    pub fn packet(&self) -> &[u8] {
        &self.packet
    }

    /// Drop every queued write.
    pub fn clear(&mut self) {
        self.packet.clear();
        self.count = 0;
    }
}
