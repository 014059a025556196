//! System-wide constants for the AnyIO workspace.
//!
//! Single source of truth for protocol limits, default timings and batch
//! capacities. Imported by all crates, never duplicated.

use static_assertions::const_assert;

/// Well-known LBP16 UDP port on the board.
pub const LBP16_UDP_PORT: u16 = 27181;

/// Size of an LBP16 command header (command word + address).
pub const HEADER_LEN: usize = 4;

/// Maximum number of words a single LBP16 command can transfer.
pub const MAX_TRANSFER_WORDS: usize = 127;

/// Maximum payload of a single HostMot2 register transfer (32-bit words).
pub const MAX_TRANSFER_BYTES: usize = MAX_TRANSFER_WORDS * 4;

/// Maximum UDP payload exchanged with a board in either direction.
pub const MAX_PACKET_SIZE: usize = 1400;

/// Maximum number of reads that can be queued in one batch.
pub const MAX_QUEUED_READS: usize = 128;

/// Ceiling of the sticky communication error counter.
pub const ERROR_CEILING: u8 = 10;

/// Amount the sticky error counter decays on every successful batch.
pub const ERROR_DECAY: u8 = 2;

/// Length of the board identification string.
pub const BOARD_NAME_LEN: usize = 16;

/// HostMot2 register holding the offset of the IDROM block.
pub const IDROM_POINTER_REGISTER: u16 = 0x010C;

/// Size of the IDROM self-description block.
pub const IDROM_LEN: usize = 64;

/// Default socket send timeout in microseconds.
pub const SEND_TIMEOUT_US: u64 = 10;

/// Default socket receive timeout in microseconds.
pub const RECV_TIMEOUT_US: u64 = 10;

/// Default delay between receive attempts in microseconds.
pub const POLL_INTERVAL_US: u64 = 10;

/// Default reply deadline for immediate (non-queued) transfers.
pub const IMMEDIATE_TIMEOUT_MS: u64 = 200;

/// Default system cycle time in microseconds (1 kHz = 1000 µs).
pub const CYCLE_TIME_US: u64 = 1000;

/// Default deadline for queued read replies, measured from cycle start.
pub const READ_DEADLINE_US: u64 = 800;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/anyio/eth.toml";

// A full batch of read requests must fit into one datagram.
const_assert!(MAX_QUEUED_READS * HEADER_LEN <= MAX_PACKET_SIZE);
// The largest single write (header + payload) must fit into one datagram.
const_assert!(HEADER_LEN + MAX_TRANSFER_BYTES <= MAX_PACKET_SIZE);
const_assert!(ERROR_DECAY < ERROR_CEILING);
