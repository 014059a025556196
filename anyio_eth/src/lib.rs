//! # AnyIO Ethernet Engine
//!
//! LBP16 register I/O for Mesa AnyIO Ethernet FPGA boards with batched,
//! deadline-bounded transfers for a hard real-time control cycle.
//!
//! # Module Structure
//!
//! - [`lbp16`] - Packet codec (command headers, identification replies)
//! - [`deadline`] - Bounded busy-polling used by every receive path
//! - [`transport`] - Per-board datagram transport (UDP, simulated board)
//! - [`queue`] - Read/write batch queues and the sticky error counter
//! - [`registry`] - Known board profiles, IDROM fallback, instance naming
//! - [`board`] - One board: immediate and queued entry points
//! - [`session`] - Multi-board all-or-nothing bring-up and teardown
//! - [`gate`] - Process-wide communication gate
//! - [`guard`] - Network guard boundary
//! - [`config`] - `anyio_eth` TOML configuration
//! - [`core`] - Cyclic runtime
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        anyio_eth                              │
//! │  ┌───────────┐    ┌───────────────┐    ┌──────────────────┐   │
//! │  │  EthCore  │───►│  EthSession   │───►│  BoardRegistry   │   │
//! │  │ (RT loop) │    │  (bring-up)   │    │ (profiles, names)│   │
//! │  └─────┬─────┘    └───────┬───────┘    └──────────────────┘   │
//! │        │                  ▼                                   │
//! │        │          ┌───────────────┐                           │
//! │        └─────────►│ Board         │ (LowLevelIo)              │
//! │                   │  ReadQueue    │                           │
//! │                   │  WriteQueue   │──► lbp16 codec            │
//! │                   └───────┬───────┘                           │
//! │                           ▼                                   │
//! │                   ┌───────────────┐                           │
//! │                   │  Transport    │ UdpTransport | Simulated  │
//! │                   └───────────────┘                           │
//! └───────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod board;
pub mod config;
pub mod core;
pub mod deadline;
pub mod error;
pub mod gate;
pub mod guard;
pub mod lbp16;
pub mod queue;
pub mod registry;
pub mod session;
pub mod transport;

pub use crate::board::Board;
pub use crate::config::EthConfig;
pub use crate::core::EthCore;
pub use crate::error::EthError;
pub use crate::gate::CommGate;
pub use crate::session::{BoardHandle, EthSession};
