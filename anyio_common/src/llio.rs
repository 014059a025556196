//! Low-level register I/O interface.
//!
//! This module contains the contract between board transports and the
//! register-map framework that consumes them:
//!
//! - [`interface`] - `LowLevelIo` / `Registrar` traits and error types
//! - [`types`] - Board profiles, summaries and queued-read handles

pub mod interface;
pub mod types;
