//! Board description and queued-I/O types.
//!
//! - `DeviceProfile` - Connector/pin layout resolved at identification
//! - `BoardSummary` - What the register framework learns about a board
//! - `ReadSlot` - Handle to one read inside a queued batch
//! - `CollectStatus` - Outcome of collecting a queued batch
//! - `ExecContext` - Immediate vs. cyclic caller context

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Execution context the caller of an entry point runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecContext {
    /// Bring-up, diagnostics and anything else outside the RT cycle.
    #[default]
    Immediate,
    /// Inside the hard real-time cycle.
    Cyclic,
}

/// Six-byte Ethernet hardware address in conventional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Raw octets.
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Connector and pin layout of a board.
///
/// Resolved once during identification, never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Connector names in I/O port order.
    pub connectors: Vec<String>,
    /// Number of I/O pins on every connector.
    pub pins_per_connector: u32,
    /// FPGA part identifier, `"??"` when unknown.
    pub fpga_part: String,
    /// Number of user LEDs.
    pub num_leds: u32,
}

impl DeviceProfile {
    /// Profile for hardware that is not in the static table.
    ///
    /// Connector names and part number are placeholders, LEDs are unknown.
    pub fn placeholder(io_ports: u32, port_width: u32) -> Self {
        Self {
            connectors: vec!["??".to_string(); io_ports as usize],
            pins_per_connector: port_width,
            fpga_part: "??".to_string(),
            num_leds: 0,
        }
    }

    /// Number of I/O connectors.
    pub fn num_connectors(&self) -> usize {
        self.connectors.len()
    }

    /// Total I/O pin count across all connectors.
    pub fn total_pins(&self) -> u32 {
        self.connectors.len() as u32 * self.pins_per_connector
    }
}

/// Everything the register framework is told about a board at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardSummary {
    /// Unique instance name, e.g. `hm2_7i92.0`.
    pub name: String,
    /// Identification string reported by the board, NUL padding removed.
    pub board_name: String,
    /// Board IPv4 address.
    pub address: Ipv4Addr,
    /// Board hardware address.
    pub hw_addr: MacAddr,
    /// Resolved connector layout.
    pub profile: DeviceProfile,
    /// False if the profile came from the IDROM fallback.
    pub recognized: bool,
}

/// Handle to one queued read.
///
/// Valid only for the batch it was issued in: once that batch has been
/// collected its bytes stay readable until the next batch completes or is
/// discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSlot {
    batch: u32,
    offset: u16,
    len: u16,
}

impl ReadSlot {
    /// Create a slot for `len` bytes at `offset` of batch `batch`.
    pub const fn new(batch: u32, offset: u16, len: u16) -> Self {
        Self { batch, offset, len }
    }

    /// Batch sequence number the slot belongs to.
    pub const fn batch(&self) -> u32 {
        self.batch
    }

    /// Byte offset inside the batch reply.
    pub const fn offset(&self) -> usize {
        self.offset as usize
    }

    /// Number of bytes read.
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false: zero-length reads never produce a slot.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte range inside the batch reply.
    pub const fn range(&self) -> std::ops::Range<usize> {
        self.offset()..self.offset() + self.len()
    }
}

/// Outcome of collecting queued reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectStatus {
    /// Nothing to collect, or communication is disabled.
    Idle,
    /// Every queued read was delivered.
    Complete,
    /// The batch was lost or malformed and was dropped as a whole. The link
    /// is still usable; `error_count` is the sticky counter after this loss.
    Discarded {
        /// Sticky error counter value.
        error_count: u8,
    },
}
