//! Low-level I/O trait and error types.
//!
//! This module defines:
//! - `LowLevelIo` trait - Register entry points a board exposes to the framework
//! - `Registrar` trait - Registration call into the register-map framework
//! - `LlioError` enum - Errors returned by the entry points
//! - `RegisterError` struct - Registration rejection

use crate::llio::types::{BoardSummary, CollectStatus, ReadSlot};
use std::time::Instant;
use thiserror::Error;

/// Errors returned by low-level I/O entry points.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlioError {
    /// Transfer length is zero or not a multiple of the 32-bit word size
    #[error("transfer length {0} is not a positive multiple of 4")]
    Misaligned(usize),

    /// Transfer exceeds what one LBP16 command can carry
    #[error("transfer of {len} bytes exceeds the {max} byte command limit")]
    TransferTooLarge {
        /// Requested length.
        len: usize,
        /// Per-command limit.
        max: usize,
    },

    /// Enqueueing would exceed the batch packet capacity
    #[error("batch overflow: {requested} bytes requested, {available} available")]
    BatchOverflow {
        /// Bytes the rejected operation needs.
        requested: usize,
        /// Bytes still free in the batch.
        available: usize,
    },

    /// A flushed read batch has not been collected yet
    #[error("read batch {batch} is in flight")]
    BatchInFlight {
        /// Sequence number of the uncollected batch.
        batch: u32,
    },

    /// No reply before the deadline
    #[error("no reply after {tries} attempts in {waited_us}us")]
    Timeout {
        /// Receive attempts made.
        tries: u32,
        /// Time spent waiting.
        waited_us: u64,
    },

    /// Reply length does not match the request
    #[error("reply of {actual} bytes, expected {expected}")]
    ShortReply {
        /// Expected byte count.
        expected: usize,
        /// Received byte count.
        actual: usize,
    },

    /// Packet could not be sent
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Any other transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Sustained loss: the sticky error counter reached its ceiling
    #[error("link degraded: error counter at {error_count}")]
    LinkDegraded {
        /// Sticky error counter value.
        error_count: u8,
    },
}

/// Register entry points a board hands to the register-map framework.
///
/// All entry points return a benign `Ok` without touching the network when
/// communication is disabled or the transfer size is zero.
///
/// # Timing Contracts
///
/// | Operation | Max Duration | RT Constraint |
/// |-----------|--------------|---------------|
/// | `read()` | immediate timeout (200 ms) | None (extra round-trip) |
/// | `write()` | one send timeout | None |
/// | `enqueue_*()` | no I/O | **HARD** |
/// | `flush_*()` | one send timeout | **HARD** |
/// | `collect_reads()` | caller deadline | **HARD** |
pub trait LowLevelIo: Send {
    /// Unique instance name (e.g. `hm2_7i80.0`).
    fn name(&self) -> &str;

    /// Board description resolved at identification.
    fn summary(&self) -> &BoardSummary;

    /// Read `buf.len()` bytes starting at `address`, waiting for the reply.
    ///
    /// # Errors
    /// `LlioError::Timeout` if the board does not answer in time.
    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), LlioError>;

    /// Write `data` starting at `address`.
    ///
    /// From the cyclic context this is queued like `enqueue_write()`.
    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), LlioError>;

    /// Queue a read of `size` bytes. Returns `None` when nothing was queued.
    ///
    /// # Errors
    /// `LlioError::BatchOverflow` if the batch cannot take the read; already
    /// queued reads are left untouched.
    fn enqueue_read(&mut self, address: u16, size: usize) -> Result<Option<ReadSlot>, LlioError>;

    /// Send every queued read request as one packet.
    fn flush_reads(&mut self) -> Result<(), LlioError>;

    /// Wait until `deadline` for the reply to the flushed read batch.
    ///
    /// # Errors
    /// `LlioError::LinkDegraded` once losses have saturated the error counter.
    fn collect_reads(&mut self, deadline: Instant) -> Result<CollectStatus, LlioError>;

    /// Bytes delivered for `slot`, if its batch completed.
    fn read_slot(&self, slot: ReadSlot) -> Option<&[u8]>;

    /// Queue a write; the payload is copied.
    fn enqueue_write(&mut self, address: u16, data: &[u8]) -> Result<(), LlioError>;

    /// Send every queued write as one packet.
    fn flush_writes(&mut self) -> Result<(), LlioError>;

    /// First register of a completed slot as a little-endian `u32`.
    fn read_slot_u32(&self, slot: ReadSlot) -> Option<u32> {
        let bytes = self.read_slot(slot)?.get(..4)?;
        <[u8; 4]>::try_from(bytes).ok().map(u32::from_le_bytes)
    }
}

/// Registration rejected by the register-map framework.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("registration of {board} rejected (code {code}): {reason}")]
pub struct RegisterError {
    /// Board instance name.
    pub board: String,
    /// Framework-specific non-zero result code.
    pub code: i32,
    /// Human-readable reason.
    pub reason: String,
}

/// The register-map framework's registration call.
///
/// Called once per board with its summary and the per-board configuration
/// string. Any error aborts the whole bring-up.
pub trait Registrar {
    /// Register one board.
    fn register(&mut self, summary: &BoardSummary, config: &str) -> Result<(), RegisterError>;
}
