//! One board: immediate and queued register access.
//!
//! [`BoardLink`] is the raw, ungated request/reply channel used during
//! bring-up (hardware address query, identification, IDROM reads).
//! [`Board`] wraps a link once the board is identified and implements
//! [`LowLevelIo`] for the register framework, gated by the [`CommGate`].

use crate::gate::CommGate;
use crate::lbp16::{self, CommandHeader, Direction};
use crate::queue::{ErrorHysteresis, ReadQueue, WriteQueue};
use crate::transport::{Connector, Transport, TransportError, TransportTiming};
use anyio_common::consts::{HEADER_LEN, MAX_PACKET_SIZE, MAX_TRANSFER_BYTES};
use anyio_common::llio::interface::{LlioError, LowLevelIo};
use anyio_common::llio::types::{BoardSummary, CollectStatus, ExecContext, MacAddr, ReadSlot};
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Stray datagrams drained before the next request once a reply was given up on.
const STALE_DRAIN_LIMIT: usize = 4;

/// Per-board packet counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PacketCounters {
    /// Read-request datagrams sent (immediate and batched).
    pub read_packets: u64,
    /// Write datagrams sent (immediate and batched).
    pub write_packets: u64,
    /// Read batches delivered completely.
    pub batches_completed: u64,
    /// Read batches lost or malformed.
    pub batches_discarded: u64,
    /// Stray datagrams thrown away.
    pub stale_replies: u64,
}

/// Ungated request/reply channel to one board.
pub struct BoardLink {
    transport: Box<dyn Transport>,
    rx: Vec<u8>,
    immediate_timeout: Duration,
    hw_addr: MacAddr,
    counters: PacketCounters,
    // A reply may still be in transit for a request that was given up on.
    stale_pending: bool,
}

impl BoardLink {
    /// Open a transport to `ip`.
    pub fn open(
        connector: &mut dyn Connector,
        ip: Ipv4Addr,
        timing: &TransportTiming,
        immediate_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let peer = SocketAddrV4::new(ip, anyio_common::consts::LBP16_UDP_PORT);
        let transport = connector.connect(peer, timing)?;
        Ok(Self::from_transport(transport, immediate_timeout))
    }

    /// Wrap an already open transport.
    pub fn from_transport(transport: Box<dyn Transport>, immediate_timeout: Duration) -> Self {
        Self {
            transport,
            // One spare word so oversized replies are detected, not truncated.
            rx: vec![0; MAX_PACKET_SIZE + HEADER_LEN],
            immediate_timeout,
            hw_addr: MacAddr::default(),
            counters: PacketCounters::default(),
            stale_pending: false,
        }
    }

    /// Board IPv4 address.
    pub fn ip(&self) -> Ipv4Addr {
        *self.transport.peer().ip()
    }

    /// Hardware address, all zero until `connect_hw_addr()` ran.
    pub fn hw_addr(&self) -> MacAddr {
        self.hw_addr
    }

    /// Local interface carrying the board.
    pub fn local_interface(&self) -> Option<String> {
        self.transport.local_interface()
    }

    /// Packet counters.
    pub fn counters(&self) -> PacketCounters {
        self.counters
    }

    /// Query the board's hardware address and pin it in the host ARP table.
    pub fn connect_hw_addr(&mut self) -> Result<MacAddr, LlioError> {
        let mut raw = [0u8; lbp16::HW_ADDR_REPLY_LEN];
        self.request(&CommandHeader::hw_addr_query(), &mut raw)?;
        let hw_addr = lbp16::decode_hw_addr(&raw)?;
        self.transport.pin_hw_addr(hw_addr)?;
        self.hw_addr = hw_addr;
        debug!(ip = %self.ip(), %hw_addr, "board hardware address");
        Ok(hw_addr)
    }

    /// Read the 16-byte identification string.
    pub fn identify(&mut self) -> Result<String, LlioError> {
        let mut raw = [0u8; anyio_common::consts::BOARD_NAME_LEN];
        self.request(&CommandHeader::identify(), &mut raw)?;
        Ok(lbp16::decode_board_name(&raw)?)
    }

    /// Immediate register read, waiting up to the immediate timeout.
    pub fn read_registers(&mut self, address: u16, buf: &mut [u8]) -> Result<(), LlioError> {
        let header = CommandHeader::register(Direction::Read, buf.len(), address)?;
        self.request(&header, buf)
    }

    /// Immediate register write.
    pub fn write_registers(&mut self, address: u16, data: &[u8]) -> Result<(), LlioError> {
        let header = CommandHeader::register(Direction::Write, data.len(), address)?;
        let mut packet: heapless::Vec<u8, { HEADER_LEN + MAX_TRANSFER_BYTES }> = heapless::Vec::new();
        packet
            .extend_from_slice(&header.encode())
            .map_err(|_| LlioError::TransferTooLarge {
                len: data.len(),
                max: MAX_TRANSFER_BYTES,
            })?;
        packet.extend_from_slice(data).map_err(|_| LlioError::TransferTooLarge {
            len: data.len(),
            max: MAX_TRANSFER_BYTES,
        })?;
        self.send(&packet)?;
        self.counters.write_packets += 1;
        trace!(
            ip = %self.ip(),
            cmd = format_args!("{:#06x}", header.command_word()),
            address = format_args!("{address:#06x}"),
            size = data.len(),
            "write"
        );
        Ok(())
    }

    fn request(&mut self, header: &CommandHeader, buf: &mut [u8]) -> Result<(), LlioError> {
        self.drain_stale();
        self.send(&header.encode())?;
        self.counters.read_packets += 1;
        let started = Instant::now();
        let deadline = started + self.immediate_timeout;
        let len = match self.transport.recv_with_deadline(&mut self.rx, deadline) {
            Ok(len) => len,
            Err(err) => {
                self.stale_pending = true;
                return Err(err.into());
            }
        };
        trace!(
            ip = %self.ip(),
            cmd = format_args!("{:#06x}", header.command_word()),
            address = format_args!("{:#06x}", header.address),
            size = buf.len(),
            waited_us = started.elapsed().as_micros() as u64,
            "read"
        );
        if len != buf.len() {
            self.stale_pending = true;
            return Err(LlioError::ShortReply {
                expected: buf.len(),
                actual: len,
            });
        }
        buf.copy_from_slice(&self.rx[..len]);
        Ok(())
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), LlioError> {
        self.transport.send(packet)?;
        Ok(())
    }

    fn recv_until(&mut self, deadline: Instant) -> Result<usize, TransportError> {
        self.transport.recv_with_deadline(&mut self.rx, deadline)
    }

    fn received(&self, len: usize) -> &[u8] {
        &self.rx[..len.min(self.rx.len())]
    }

    /// Throw away stray datagrams if an earlier request was given up on.
    fn drain_stale(&mut self) {
        if !self.stale_pending {
            return;
        }
        self.stale_pending = false;
        for _ in 0..STALE_DRAIN_LIMIT {
            match self.transport.recv(&mut self.rx) {
                Ok(Some(len)) => {
                    self.counters.stale_replies += 1;
                    trace!(ip = %self.ip(), len, "stale reply dropped");
                }
                _ => break,
            }
        }
    }

    /// Release the transport. Safe to call more than once.
    pub fn close(&mut self) {
        self.transport.close();
    }
}

/// An identified board.
pub struct Board {
    link: BoardLink,
    summary: BoardSummary,
    gate: CommGate,
    context: ExecContext,
    reads: ReadQueue,
    writes: WriteQueue,
    errors: ErrorHysteresis,
    warned_cyclic_read: bool,
}

impl Board {
    /// Board using `link`, gated by `gate`.
    pub fn new(link: BoardLink, summary: BoardSummary, gate: CommGate) -> Self {
        Self {
            link,
            summary,
            gate,
            context: ExecContext::Immediate,
            reads: ReadQueue::new(),
            writes: WriteQueue::new(),
            errors: ErrorHysteresis::new(),
            warned_cyclic_read: false,
        }
    }

    /// Context subsequent calls are made from.
    pub fn set_context(&mut self, context: ExecContext) {
        self.context = context;
    }

    /// Current context.
    pub fn context(&self) -> ExecContext {
        self.context
    }

    /// Sticky error counter.
    pub fn error_count(&self) -> u8 {
        self.errors.count()
    }

    /// Packet counters.
    pub fn counters(&self) -> PacketCounters {
        self.link.counters()
    }

    /// Reads queued in the current batch.
    pub fn queued_reads(&self) -> usize {
        self.reads.len()
    }

    /// Writes queued in the current batch.
    pub fn queued_writes(&self) -> usize {
        self.writes.len()
    }

    /// Close the transport and drop anything queued.
    pub fn close(&mut self) {
        self.reads.discard();
        self.writes.clear();
        self.link.close();
    }

    fn batch_failed(&mut self, reason: &LlioError) -> Result<CollectStatus, LlioError> {
        self.reads.discard();
        self.link.stale_pending = true;
        self.link.counters.batches_discarded += 1;
        let error_count = self.errors.record_failure();
        warn!(board = %self.summary.name, error_count, "read batch discarded: {reason}");
        if self.errors.is_saturated() {
            return Err(LlioError::LinkDegraded { error_count });
        }
        Ok(CollectStatus::Discarded { error_count })
    }
}

impl LowLevelIo for Board {
    fn name(&self) -> &str {
        &self.summary.name
    }

    fn summary(&self) -> &BoardSummary {
        &self.summary
    }

    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), LlioError> {
        if !self.gate.is_open() || buf.is_empty() {
            return Ok(());
        }
        if self.context == ExecContext::Cyclic && !self.warned_cyclic_read {
            self.warned_cyclic_read = true;
            warn!(
                board = %self.summary.name,
                "immediate read from the cyclic context costs a full round-trip"
            );
        }
        self.link.read_registers(address, buf)
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), LlioError> {
        if !self.gate.is_open() || data.is_empty() {
            return Ok(());
        }
        if self.context == ExecContext::Cyclic {
            return self.writes.enqueue(address, data);
        }
        self.link.write_registers(address, data)
    }

    fn enqueue_read(&mut self, address: u16, size: usize) -> Result<Option<ReadSlot>, LlioError> {
        if !self.gate.is_open() {
            return Ok(None);
        }
        self.reads.enqueue(address, size)
    }

    fn flush_reads(&mut self) -> Result<(), LlioError> {
        if !self.gate.is_open() || self.reads.is_empty() {
            return Ok(());
        }
        if self.reads.in_flight() {
            return Err(LlioError::BatchInFlight {
                batch: self.reads.batch(),
            });
        }
        self.link.drain_stale();
        match self.link.send(self.reads.request_packet()) {
            Ok(()) => {
                self.reads.mark_flushed();
                self.link.counters.read_packets += 1;
                trace!(
                    board = %self.summary.name,
                    reads = self.reads.len(),
                    reply_len = self.reads.expected_reply_len(),
                    "read batch flushed"
                );
                Ok(())
            }
            Err(err) => {
                self.reads.discard();
                self.link.counters.batches_discarded += 1;
                let error_count = self.errors.record_failure();
                warn!(board = %self.summary.name, error_count, "read batch not sent: {err}");
                if self.errors.is_saturated() {
                    return Err(LlioError::LinkDegraded { error_count });
                }
                Err(err)
            }
        }
    }

    fn collect_reads(&mut self, deadline: Instant) -> Result<CollectStatus, LlioError> {
        if !self.gate.is_open() || !self.reads.in_flight() {
            return Ok(CollectStatus::Idle);
        }
        let len = match self.link.recv_until(deadline) {
            Ok(len) => len,
            Err(err) => return self.batch_failed(&LlioError::from(err)),
        };
        match self.reads.complete(self.link.received(len)) {
            Ok(()) => {
                self.errors.record_success();
                self.link.counters.batches_completed += 1;
                Ok(CollectStatus::Complete)
            }
            Err(err) => self.batch_failed(&err),
        }
    }

    fn read_slot(&self, slot: ReadSlot) -> Option<&[u8]> {
        self.reads.slot(slot)
    }

    fn enqueue_write(&mut self, address: u16, data: &[u8]) -> Result<(), LlioError> {
        if !self.gate.is_open() {
            return Ok(());
        }
        self.writes.enqueue(address, data)
    }

    fn flush_writes(&mut self) -> Result<(), LlioError> {
        if !self.gate.is_open() || self.writes.is_empty() {
            return Ok(());
        }
        let result = self.link.send(self.writes.packet());
        if result.is_ok() {
            self.link.counters.write_packets += 1;
            trace!(
                board = %self.summary.name,
                writes = self.writes.len(),
                len = self.writes.packet().len(),
                "write batch flushed"
            );
        }
        self.writes.clear();
        result
    }
}
