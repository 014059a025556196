//! In-process LBP16 board emulator.
//!
//! [`SimulatedBoard`] answers LBP16 datagrams from an in-memory register
//! file the way a real board does: every write in a datagram is applied,
//! every read contributes its bytes to one reply datagram. A [`SimHandle`]
//! shares the board state with the test (or the `--simulate` binary) for
//! register setup, fault injection and call counting.

use super::{Connector, Transport, TransportError, TransportTiming};
use crate::lbp16::{self, CommandHeader, Direction, MemorySpace};
use anyio_common::consts::{HEADER_LEN, IDROM_LEN, IDROM_POINTER_REGISTER};
use anyio_common::llio::types::MacAddr;
use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

const REGISTER_SPACE: usize = 1 << 16;

/// Offset the emulator places the IDROM at.
pub const SIM_IDROM_OFFSET: u16 = 0x0400;

/// Socket-level call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCalls {
    /// `send()` calls.
    pub sends: u64,
    /// `recv()` calls.
    pub recvs: u64,
    /// `pin_hw_addr()` calls.
    pub pins: u64,
    /// `close()` calls.
    pub closes: u64,
}

impl SimCalls {
    /// Sends plus receives.
    pub fn socket_calls(&self) -> u64 {
        self.sends + self.recvs
    }
}

#[derive(Debug)]
struct SimState {
    board_name: String,
    hw_addr: MacAddr,
    registers: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
    drop_all: bool,
    drop_next: u32,
    truncate_next: u32,
    fail_pin: bool,
    pinned: Option<MacAddr>,
    open: bool,
    calls: SimCalls,
}

impl SimState {
    fn handle_datagram(&mut self, bytes: &[u8]) {
        let mut reply = Vec::new();
        let mut rest = bytes;
        while rest.len() >= HEADER_LEN {
            let Ok(header) = lbp16::decode_header(rest) else {
                break;
            };
            rest = &rest[HEADER_LEN..];
            let len = header.byte_len();
            match header.direction {
                Direction::Write => {
                    let Some(payload) = rest.get(..len) else {
                        break;
                    };
                    self.write(&header, payload);
                    rest = &rest[len..];
                }
                Direction::Read => self.read(&header, &mut reply),
            }
        }

        if reply.is_empty() {
            return;
        }
        if self.drop_all {
            return;
        }
        if self.drop_next > 0 {
            self.drop_next -= 1;
            return;
        }
        if self.truncate_next > 0 {
            self.truncate_next -= 1;
            reply.truncate(reply.len().saturating_sub(4));
        }
        self.replies.push_back(reply);
    }

    fn write(&mut self, header: &CommandHeader, payload: &[u8]) {
        if header.space != MemorySpace::HostMot2 {
            return;
        }
        let start = header.address as usize;
        let end = (start + payload.len()).min(REGISTER_SPACE);
        self.registers[start..end].copy_from_slice(&payload[..end - start]);
    }

    fn read(&self, header: &CommandHeader, reply: &mut Vec<u8>) {
        let len = header.byte_len();
        match header.space {
            MemorySpace::HostMot2 => {
                let start = header.address as usize;
                let end = (start + len).min(REGISTER_SPACE);
                reply.extend_from_slice(&self.registers[start..end]);
                reply.resize(reply.len() + len - (end - start), 0);
            }
            MemorySpace::BoardInfo if header.address == 0 => {
                let name = lbp16::encode_board_name(&self.board_name);
                let mut chunk = vec![0u8; len];
                for (dst, src) in chunk.iter_mut().zip(name) {
                    *dst = src;
                }
                reply.extend_from_slice(&chunk);
            }
            MemorySpace::EthernetEeprom if header == &CommandHeader::hw_addr_query() => {
                reply.extend_from_slice(&lbp16::encode_hw_addr(self.hw_addr));
            }
            _ => reply.resize(reply.len() + len, 0),
        }
    }
}

/// Shared view of one emulated board.
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Board answering identification with `board_name`.
    pub fn new(board_name: &str, hw_addr: MacAddr) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                board_name: board_name.to_string(),
                hw_addr,
                registers: vec![0; REGISTER_SPACE],
                replies: VecDeque::new(),
                drop_all: false,
                drop_next: 0,
                truncate_next: 0,
                fail_pin: false,
                pinned: None,
                open: false,
                calls: SimCalls::default(),
            })),
        }
    }

    /// Board with an IDROM describing `io_ports` connectors of `port_width`
    /// pins.
    pub fn with_idrom(board_name: &str, hw_addr: MacAddr, io_ports: u32, port_width: u32) -> Self {
        let handle = Self::new(board_name, hw_addr);
        let mut idrom = [0u8; IDROM_LEN];
        idrom[0..4].copy_from_slice(&2u32.to_le_bytes());
        idrom[28..32].copy_from_slice(&io_ports.to_le_bytes());
        idrom[32..36].copy_from_slice(&(io_ports * port_width).to_le_bytes());
        idrom[36..40].copy_from_slice(&port_width.to_le_bytes());
        idrom[40..44].copy_from_slice(&50_000_000u32.to_le_bytes());
        handle.set_bytes(SIM_IDROM_OFFSET, &idrom);
        handle.set_register_u32(IDROM_POINTER_REGISTER, SIM_IDROM_OFFSET as u32);
        handle
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write raw bytes into the register file.
    pub fn set_bytes(&self, address: u16, bytes: &[u8]) {
        let mut state = self.lock();
        let start = address as usize;
        let end = (start + bytes.len()).min(REGISTER_SPACE);
        state.registers[start..end].copy_from_slice(&bytes[..end - start]);
    }

    /// Write a little-endian register.
    pub fn set_register_u32(&self, address: u16, value: u32) {
        self.set_bytes(address, &value.to_le_bytes());
    }

    /// Read raw bytes from the register file.
    pub fn bytes(&self, address: u16, len: usize) -> Vec<u8> {
        let state = self.lock();
        let start = address as usize;
        let end = (start + len).min(REGISTER_SPACE);
        state.registers[start..end].to_vec()
    }

    /// Read a little-endian register.
    pub fn register_u32(&self, address: u16) -> u32 {
        let bytes = self.bytes(address, 4);
        <[u8; 4]>::try_from(bytes.as_slice()).map_or(0, u32::from_le_bytes)
    }

    /// Drop every reply (100% loss) while `on`.
    pub fn set_drop_all(&self, on: bool) {
        self.lock().drop_all = on;
    }

    /// Drop the next `count` replies.
    pub fn drop_next_replies(&self, count: u32) {
        self.lock().drop_next = count;
    }

    /// Cut the last word off the next `count` replies.
    pub fn truncate_next_replies(&self, count: u32) {
        self.lock().truncate_next = count;
    }

    /// Queue a stray datagram as if the board had sent it.
    pub fn inject_reply(&self, bytes: &[u8]) {
        self.lock().replies.push_back(bytes.to_vec());
    }

    /// Make `pin_hw_addr()` fail.
    pub fn set_fail_pin(&self, on: bool) {
        self.lock().fail_pin = on;
    }

    /// Call counters so far.
    pub fn calls(&self) -> SimCalls {
        self.lock().calls
    }

    /// Hardware address currently pinned, if any.
    pub fn pinned(&self) -> Option<MacAddr> {
        self.lock().pinned
    }

    /// True between connect and close.
    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

/// Transport end of an emulated board.
#[derive(Debug)]
pub struct SimulatedBoard {
    peer: SocketAddrV4,
    handle: SimHandle,
}

impl SimulatedBoard {
    /// Open a transport to the board behind `handle`.
    pub fn new(peer: SocketAddrV4, handle: SimHandle) -> Self {
        handle.lock().open = true;
        Self { peer, handle }
    }
}

impl Transport for SimulatedBoard {
    fn peer(&self) -> SocketAddrV4 {
        self.peer
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.handle.lock();
        state.calls.sends += 1;
        if !state.open {
            return Err(TransportError::Closed);
        }
        state.handle_datagram(bytes);
        Ok(bytes.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        let mut state = self.handle.lock();
        state.calls.recvs += 1;
        if !state.open {
            return Err(TransportError::Closed);
        }
        let Some(reply) = state.replies.pop_front() else {
            return Ok(None);
        };
        let len = reply.len().min(buf.len());
        buf[..len].copy_from_slice(&reply[..len]);
        trace!(peer = %self.peer, len, "simulated reply");
        Ok(Some(len))
    }

    fn pin_hw_addr(&mut self, hw_addr: MacAddr) -> Result<(), TransportError> {
        let mut state = self.handle.lock();
        state.calls.pins += 1;
        if state.fail_pin {
            return Err(TransportError::HwAddr(format!(
                "simulated pin failure for {}",
                self.peer
            )));
        }
        state.pinned = Some(hw_addr);
        Ok(())
    }

    fn local_interface(&self) -> Option<String> {
        Some("sim0".to_string())
    }

    fn close(&mut self) {
        let mut state = self.handle.lock();
        state.calls.closes += 1;
        state.open = false;
        state.pinned = None;
        state.replies.clear();
    }
}

/// Connects to emulated boards by IP address.
#[derive(Debug, Default, Clone)]
pub struct SimConnector {
    boards: HashMap<Ipv4Addr, SimHandle>,
}

impl SimConnector {
    /// Empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `handle` at `ip`; returns the handle for chaining in tests.
    pub fn add_board(&mut self, ip: Ipv4Addr, handle: SimHandle) -> SimHandle {
        self.boards.insert(ip, handle.clone());
        handle
    }

    /// Board at `ip`.
    pub fn board(&self, ip: Ipv4Addr) -> Option<&SimHandle> {
        self.boards.get(&ip)
    }
}

impl Connector for SimConnector {
    fn connect(&mut self, peer: SocketAddrV4, _timing: &TransportTiming) -> Result<Box<dyn Transport>, TransportError> {
        let handle = self
            .boards
            .get(peer.ip())
            .cloned()
            .ok_or_else(|| TransportError::Open {
                peer,
                reason: "no simulated board at this address".to_string(),
            })?;
        Ok(Box::new(SimulatedBoard::new(peer, handle)))
    }
}
