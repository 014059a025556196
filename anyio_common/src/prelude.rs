//! Prelude module for common re-exports.
//!
//! ```rust
//! use anyio_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Limits ─────────────────────────────────────────────────────────
pub use crate::consts::{LBP16_UDP_PORT, MAX_PACKET_SIZE, MAX_QUEUED_READS, MAX_TRANSFER_BYTES};

// ─── Low-level I/O ──────────────────────────────────────────────────
pub use crate::llio::interface::{LlioError, LowLevelIo, RegisterError, Registrar};
pub use crate::llio::types::{
    BoardSummary, CollectStatus, DeviceProfile, ExecContext, MacAddr, ReadSlot,
};

/// Default reply deadline for immediate transfers.
pub const DEFAULT_IMMEDIATE_TIMEOUT: Duration =
    Duration::from_millis(crate::consts::IMMEDIATE_TIMEOUT_MS);
