//! AnyIO Common Library
//!
//! This crate provides shared constants, configuration loading utilities and
//! the low-level register I/O interface used by the AnyIO Ethernet engine and
//! by the register-map framework built on top of it.
//!
//! # Module Structure
//!
//! - [`consts`] - Protocol, timing and batch size limits
//! - [`config`] - Configuration loading traits and types
//! - [`llio`] - Low-level I/O trait, board profiles and error types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use anyio_common::prelude::*;
//!
//! let profile = DeviceProfile::placeholder(2, 17);
//! assert_eq!(profile.connectors, vec!["??", "??"]);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod consts;
pub mod llio;
pub mod prelude;
