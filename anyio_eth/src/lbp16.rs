//! LBP16 packet codec.
//!
//! Pure encoding and decoding of LBP16 command headers and the fixed replies
//! used during identification. No I/O.
//!
//! # Header Layout
//!
//! ```text
//!  byte 0      byte 1      byte 2      byte 3
//! ┌───────────┬───────────┬───────────┬───────────┐
//! │ cmd (lo)  │ cmd (hi)  │ addr (lo) │ addr (hi) │
//! └───────────┴───────────┴───────────┴───────────┘
//!
//! cmd bit 15     write
//!     bit 14     address included
//!     bits 12-10 memory space
//!     bits 9-8   transfer width (8/16/32/64 bit)
//!     bit 7      address auto-increment
//!     bits 6-0   transfer count in words
//! ```

use anyio_common::consts::{BOARD_NAME_LEN, HEADER_LEN, MAX_TRANSFER_WORDS};
use anyio_common::llio::interface::LlioError;
use anyio_common::llio::types::MacAddr;
use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Single-bit fields of the LBP16 command word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u16 {
        /// Write (set) or read (clear).
        const WRITE = 0x8000;
        /// The address field is present.
        const ADDRESS = 0x4000;
        /// Address auto-increments after each word.
        const INCREMENT = 0x0080;
    }
}

const SPACE_SHIFT: u16 = 10;
const SPACE_MASK: u16 = 0x7 << SPACE_SHIFT;
const WIDTH_SHIFT: u16 = 8;
const WIDTH_MASK: u16 = 0x3 << WIDTH_SHIFT;
const COUNT_MASK: u16 = 0x007F;

/// EEPROM address of the board's hardware address.
const HW_ADDR_EEPROM_ADDRESS: u16 = 0x0002;

/// Length of the hardware-address reply.
pub const HW_ADDR_REPLY_LEN: usize = 6;

/// Codec errors.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Byte length is zero or not a multiple of the transfer width.
    #[error("length {0} is not a positive multiple of the word size")]
    Misaligned(usize),

    /// Byte length needs more than the 7-bit transfer count allows.
    #[error("length {len} exceeds {max} bytes per command")]
    TooLarge {
        /// Requested length.
        len: usize,
        /// Per-command limit for the transfer width.
        max: usize,
    },

    /// Not enough bytes to decode.
    #[error("truncated input: {0} bytes")]
    Truncated(usize),

    /// Memory space 5 is not defined by LBP16.
    #[error("unknown memory space {0}")]
    UnknownSpace(u8),
}

impl From<CodecError> for LlioError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Misaligned(len) => LlioError::Misaligned(len),
            CodecError::TooLarge { len, max } => LlioError::TransferTooLarge { len, max },
            CodecError::Truncated(actual) => LlioError::ShortReply {
                expected: HEADER_LEN,
                actual,
            },
            CodecError::UnknownSpace(space) => {
                LlioError::Transport(format!("unknown memory space {space}"))
            }
        }
    }
}

/// Transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Board to host.
    Read,
    /// Host to board.
    Write,
}

/// Whether the address advances between words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// Address advances by the transfer width after every word.
    Increment,
    /// Every word targets the same address.
    Fixed,
}

/// LBP16 memory space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MemorySpace {
    /// HostMot2 register file.
    HostMot2 = 0,
    /// Ethernet chip registers.
    EthernetChip = 1,
    /// Ethernet configuration EEPROM.
    EthernetEeprom = 2,
    /// FPGA configuration flash.
    FpgaFlash = 3,
    /// LBP16 timers.
    Timers = 4,
    /// Communication control.
    CommControl = 6,
    /// Read-only board information.
    BoardInfo = 7,
}

impl MemorySpace {
    /// Convert from the 3-bit space field.
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::HostMot2),
            1 => Some(Self::EthernetChip),
            2 => Some(Self::EthernetEeprom),
            3 => Some(Self::FpgaFlash),
            4 => Some(Self::Timers),
            6 => Some(Self::CommControl),
            7 => Some(Self::BoardInfo),
            _ => None,
        }
    }
}

/// Transfer word width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Width {
    /// 8-bit words.
    Bits8 = 0,
    /// 16-bit words.
    Bits16 = 1,
    /// 32-bit words.
    Bits32 = 2,
    /// 64-bit words.
    Bits64 = 3,
}

impl Width {
    /// Bytes per word.
    pub const fn bytes(self) -> usize {
        1 << self as usize
    }

    const fn from_index(index: u8) -> Self {
        match index & 0x3 {
            0 => Self::Bits8,
            1 => Self::Bits16,
            2 => Self::Bits32,
            _ => Self::Bits64,
        }
    }
}

/// Decoded LBP16 command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Transfer direction.
    pub direction: Direction,
    /// Target memory space.
    pub space: MemorySpace,
    /// Word width.
    pub width: Width,
    /// Address auto-increment.
    pub mode: AddressMode,
    /// Number of words, 1..=127.
    pub word_count: u8,
    /// Base address.
    pub address: u16,
}

impl CommandHeader {
    /// Build a header for a transfer of `byte_len` bytes.
    ///
    /// # Errors
    /// `Misaligned` for zero or non word-multiple lengths, `TooLarge` above
    /// 127 words.
    pub fn new(
        direction: Direction,
        space: MemorySpace,
        width: Width,
        mode: AddressMode,
        byte_len: usize,
        address: u16,
    ) -> Result<Self, CodecError> {
        let word = width.bytes();
        if byte_len == 0 || byte_len % word != 0 {
            return Err(CodecError::Misaligned(byte_len));
        }
        let words = byte_len / word;
        if words > MAX_TRANSFER_WORDS {
            return Err(CodecError::TooLarge {
                len: byte_len,
                max: MAX_TRANSFER_WORDS * word,
            });
        }
        Ok(Self {
            direction,
            space,
            width,
            mode,
            word_count: words as u8,
            address,
        })
    }

    /// HostMot2 32-bit incrementing register transfer.
    pub fn register(direction: Direction, byte_len: usize, address: u16) -> Result<Self, CodecError> {
        Self::new(
            direction,
            MemorySpace::HostMot2,
            Width::Bits32,
            AddressMode::Increment,
            byte_len,
            address,
        )
    }

    /// Board identification request: 16 bytes of board info at address 0.
    pub const fn identify() -> Self {
        Self {
            direction: Direction::Read,
            space: MemorySpace::BoardInfo,
            width: Width::Bits16,
            mode: AddressMode::Increment,
            word_count: (BOARD_NAME_LEN / 2) as u8,
            address: 0,
        }
    }

    /// Hardware-address query: three 16-bit EEPROM words at address 2.
    pub const fn hw_addr_query() -> Self {
        Self {
            direction: Direction::Read,
            space: MemorySpace::EthernetEeprom,
            width: Width::Bits16,
            mode: AddressMode::Increment,
            word_count: (HW_ADDR_REPLY_LEN / 2) as u8,
            address: HW_ADDR_EEPROM_ADDRESS,
        }
    }

    /// Payload length in bytes.
    pub const fn byte_len(&self) -> usize {
        self.word_count as usize * self.width.bytes()
    }

    /// The 16-bit command word.
    pub fn command_word(&self) -> u16 {
        let mut flags = CommandFlags::ADDRESS;
        if self.direction == Direction::Write {
            flags |= CommandFlags::WRITE;
        }
        if self.mode == AddressMode::Increment {
            flags |= CommandFlags::INCREMENT;
        }
        flags.bits()
            | ((self.space as u16) << SPACE_SHIFT)
            | ((self.width as u16) << WIDTH_SHIFT)
            | (self.word_count as u16 & COUNT_MASK)
    }

    /// Wire representation.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let [c0, c1] = self.command_word().to_le_bytes();
        let [a0, a1] = self.address.to_le_bytes();
        [c0, c1, a0, a1]
    }

    /// Parse a header from the first four bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let Some(raw) = bytes.get(..HEADER_LEN) else {
            return Err(CodecError::Truncated(bytes.len()));
        };
        let cmd = u16::from_le_bytes([raw[0], raw[1]]);
        let address = u16::from_le_bytes([raw[2], raw[3]]);
        let flags = CommandFlags::from_bits_truncate(cmd);

        let space_index = ((cmd & SPACE_MASK) >> SPACE_SHIFT) as u8;
        let space =
            MemorySpace::from_index(space_index).ok_or(CodecError::UnknownSpace(space_index))?;

        Ok(Self {
            direction: if flags.contains(CommandFlags::WRITE) {
                Direction::Write
            } else {
                Direction::Read
            },
            space,
            width: Width::from_index(((cmd & WIDTH_MASK) >> WIDTH_SHIFT) as u8),
            mode: if flags.contains(CommandFlags::INCREMENT) {
                AddressMode::Increment
            } else {
                AddressMode::Fixed
            },
            word_count: (cmd & COUNT_MASK) as u8,
            address,
        })
    }
}

/// Encode a 4-byte HostMot2 register header.
pub fn encode_header(
    direction: Direction,
    mode: AddressMode,
    byte_len: usize,
    address: u16,
) -> Result<[u8; HEADER_LEN], CodecError> {
    CommandHeader::new(
        direction,
        MemorySpace::HostMot2,
        Width::Bits32,
        mode,
        byte_len,
        address,
    )
    .map(|header| header.encode())
}

/// Decode a 4-byte header.
pub fn decode_header(bytes: &[u8]) -> Result<CommandHeader, CodecError> {
    CommandHeader::decode(bytes)
}

/// Convert the EEPROM-ordered hardware-address reply to conventional order.
pub fn decode_hw_addr(reply: &[u8]) -> Result<MacAddr, CodecError> {
    let raw: [u8; HW_ADDR_REPLY_LEN] = reply
        .try_into()
        .map_err(|_| CodecError::Truncated(reply.len()))?;
    let mut mac = raw;
    mac.reverse();
    Ok(MacAddr(mac))
}

/// EEPROM-ordered bytes for `mac`, as the board sends them.
pub fn encode_hw_addr(mac: MacAddr) -> [u8; HW_ADDR_REPLY_LEN] {
    let mut raw = mac.octets();
    raw.reverse();
    raw
}

/// Board name from the 16-byte identification reply, NUL padding removed.
pub fn decode_board_name(reply: &[u8]) -> Result<String, CodecError> {
    if reply.len() != BOARD_NAME_LEN {
        return Err(CodecError::Truncated(reply.len()));
    }
    let end = reply.iter().position(|&b| b == 0).unwrap_or(reply.len());
    Ok(String::from_utf8_lossy(&reply[..end]).trim_end().to_string())
}

/// NUL-padded identification reply for `name`, truncated to 16 bytes.
pub fn encode_board_name(name: &str) -> [u8; BOARD_NAME_LEN] {
    let mut out = [0u8; BOARD_NAME_LEN];
    for (dst, src) in out.iter_mut().zip(name.bytes()) {
        *dst = src;
    }
    out
}
