//! Board registry.
//!
//! Resolves a board's identification string to its connector layout and
//! hands out unique instance names.
//!
//! Known boards come from a static table keyed by name prefix. Anything
//! else is described from the board's own IDROM: the pointer register gives
//! the IDROM offset, the IDROM gives the I/O port count and width.

use anyio_common::consts::{IDROM_LEN, IDROM_POINTER_REGISTER};
use anyio_common::llio::interface::LlioError;
use anyio_common::llio::types::DeviceProfile;
use std::collections::HashMap;
use tracing::{info, warn};

/// One known board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileEntry {
    /// Identification-string prefix, uppercase.
    pub prefix: &'static str,
    /// Short name used in instance names.
    pub short_name: &'static str,
    /// Connector names in I/O port order.
    pub connectors: &'static [&'static str],
    /// Pins per connector.
    pub pins_per_connector: u32,
    /// FPGA part.
    pub fpga_part: &'static str,
    /// User LEDs.
    pub num_leds: u32,
}

impl ProfileEntry {
    /// Owned profile for this entry.
    pub fn profile(&self) -> DeviceProfile {
        DeviceProfile {
            connectors: self.connectors.iter().map(|c| c.to_string()).collect(),
            pins_per_connector: self.pins_per_connector,
            fpga_part: self.fpga_part.to_string(),
            num_leds: self.num_leds,
        }
    }
}

const DB25_CONNECTORS: &[&str] = &["J2", "J3", "J4", "J5"];
const HD_CONNECTORS: &[&str] = &["P1", "P2", "P3"];

/// Boards with a fixed profile.
pub static KNOWN_BOARDS: [ProfileEntry; 6] = [
    ProfileEntry {
        prefix: "7I80DB-16",
        short_name: "7i80",
        connectors: DB25_CONNECTORS,
        pins_per_connector: 17,
        fpga_part: "XC6SLX16",
        num_leds: 4,
    },
    ProfileEntry {
        prefix: "7I80DB-25",
        short_name: "7i80",
        connectors: DB25_CONNECTORS,
        pins_per_connector: 17,
        fpga_part: "XC6SLX25",
        num_leds: 4,
    },
    ProfileEntry {
        prefix: "7I80HD-16",
        short_name: "7i80",
        connectors: HD_CONNECTORS,
        pins_per_connector: 24,
        fpga_part: "XC6SLX16",
        num_leds: 4,
    },
    ProfileEntry {
        prefix: "7I80HD-25",
        short_name: "7i80",
        connectors: HD_CONNECTORS,
        pins_per_connector: 24,
        fpga_part: "XC6SLX25",
        num_leds: 4,
    },
    ProfileEntry {
        prefix: "7I76E-16",
        short_name: "7i76e",
        connectors: HD_CONNECTORS,
        pins_per_connector: 17,
        fpga_part: "XC6SLX16",
        num_leds: 4,
    },
    ProfileEntry {
        prefix: "7I92",
        short_name: "7i92",
        connectors: &["P2", "P1"],
        pins_per_connector: 17,
        fpga_part: "XC6SLX9",
        num_leds: 4,
    },
];

/// Characters of an unknown board's name used for its instance name.
/// The whole prefix is lowercased, so `UnKnown` and `UNKNOWN` both become `unkn`
/// and share one instance counter with every other instance name.
const UNKNOWN_SHORT_NAME_LEN: usize = 4;

/// HostMot2 IDROM block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Idrom {
    /// IDROM layout version.
    pub idrom_type: u32,
    /// Offset of the module descriptors.
    pub offset_to_modules: u32,
    /// Offset of the pin descriptors.
    pub offset_to_pin_desc: u32,
    /// Board name as stored in the IDROM (8 bytes).
    pub board_name: [u8; 8],
    /// FPGA size code.
    pub fpga_size: u32,
    /// FPGA pin count.
    pub fpga_pins: u32,
    /// Number of I/O ports (connectors).
    pub io_ports: u32,
    /// Total I/O pins.
    pub io_width: u32,
    /// Pins per I/O port.
    pub port_width: u32,
    /// Low clock frequency in Hz.
    pub clock_low: u32,
    /// High clock frequency in Hz.
    pub clock_high: u32,
}

impl Idrom {
    /// Parse a 64-byte IDROM block.
    pub fn parse(bytes: &[u8]) -> Result<Self, LlioError> {
        if bytes.len() < IDROM_LEN {
            return Err(LlioError::ShortReply {
                expected: IDROM_LEN,
                actual: bytes.len(),
            });
        }
        let word = |offset: usize| u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]);
        let mut board_name = [0u8; 8];
        board_name.copy_from_slice(&bytes[12..20]);
        Ok(Self {
            idrom_type: word(0),
            offset_to_modules: word(4),
            offset_to_pin_desc: word(8),
            board_name,
            fpga_size: word(20),
            fpga_pins: word(24),
            io_ports: word(28),
            io_width: word(32),
            port_width: word(36),
            clock_low: word(40),
            clock_high: word(44),
        })
    }

    /// Placeholder profile with the IDROM's port count and width.
    pub fn profile(&self) -> DeviceProfile {
        DeviceProfile::placeholder(self.io_ports, self.port_width)
    }
}

/// Per-prefix instance counters, unique for the life of the registry.
#[derive(Debug, Default)]
pub struct NameAllocator {
    counters: HashMap<String, u32>,
}

impl NameAllocator {
    /// Next instance name for `short_name`: `hm2_<short_name>.<n>`.
    pub fn allocate(&mut self, short_name: &str) -> String {
        let counter = self.counters.entry(short_name.to_string()).or_insert(0);
        let name = format!("hm2_{short_name}.{counter}");
        *counter += 1;
        name
    }
}

/// Identification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Instance name.
    pub name: String,
    /// Resolved layout.
    pub profile: DeviceProfile,
    /// False if resolved through the IDROM.
    pub recognized: bool,
}

/// Known profiles plus instance naming.
#[derive(Debug, Default)]
pub struct BoardRegistry {
    names: NameAllocator,
}

impl BoardRegistry {
    /// Registry with fresh name counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Known entry whose prefix matches `board_name`, ignoring case.
    pub fn lookup(board_name: &str) -> Option<&'static ProfileEntry> {
        let normalized = board_name.to_ascii_uppercase();
        KNOWN_BOARDS.iter().find(|entry| normalized.starts_with(entry.prefix))
    }

    /// Resolve `board_name` and allocate an instance name.
    ///
    /// `read` performs an immediate register read; it is only called for
    /// unknown boards.
    pub fn identify<F>(&mut self, board_name: &str, mut read: F) -> Result<Identity, LlioError>
    where
        F: FnMut(u16, &mut [u8]) -> Result<(), LlioError>,
    {
        if let Some(entry) = Self::lookup(board_name) {
            let name = self.names.allocate(entry.short_name);
            info!(board = board_name, name = %name, "discovered {}", entry.prefix);
            return Ok(Identity {
                name,
                profile: entry.profile(),
                recognized: true,
            });
        }

        warn!(
            board = board_name,
            "unrecognized ethernet board, connector names will be placeholders"
        );
        let mut pointer = [0u8; 4];
        read(IDROM_POINTER_REGISTER, &mut pointer)?;
        let offset = (u32::from_le_bytes(pointer) & 0xFFFF) as u16;
        let mut block = [0u8; IDROM_LEN];
        read(offset, &mut block)?;
        let idrom = Idrom::parse(&block)?;

        let short_name: String = board_name
            .chars()
            .take(UNKNOWN_SHORT_NAME_LEN)
            .collect::<String>()
            .to_lowercase();
        let name = self.names.allocate(&short_name);
        info!(
            board = board_name,
            name = %name,
            idrom_offset = offset,
            io_ports = idrom.io_ports,
            port_width = idrom.port_width,
            "described by IDROM"
        );
        Ok(Identity {
            name,
            profile: idrom.profile(),
            recognized: false,
        })
    }
}
