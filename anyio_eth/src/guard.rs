//! Network guard boundary.
//!
//! Real installations shield the control interface from unrelated host
//! traffic (typically with firewall rules). The session calls the guard
//! before any board is trusted, once per local interface that carries a
//! board, and after teardown.

use thiserror::Error;
use tracing::warn;

/// Guard failure; aborts bring-up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("network guard failed on {scope}: {reason}")]
pub struct GuardError {
    /// Interface name, or `"host"` for `prepare()`.
    pub scope: String,
    /// Reason.
    pub reason: String,
}

/// Shields board interfaces from other traffic.
pub trait NetworkGuard: Send {
    /// Called once before the first board is opened.
    fn prepare(&mut self) -> Result<(), GuardError>;

    /// Called once per distinct local interface carrying a board.
    fn protect_interface(&mut self, interface: &str) -> Result<(), GuardError>;

    /// Called after every board has been closed.
    fn release(&mut self);
}

/// Guard that installs nothing and says so.
#[derive(Debug, Default)]
pub struct PermissiveGuard;

impl NetworkGuard for PermissiveGuard {
    fn prepare(&mut self) -> Result<(), GuardError> {
        warn!("no network guard installed, other traffic may violate real-time guarantees");
        Ok(())
    }

    fn protect_interface(&mut self, interface: &str) -> Result<(), GuardError> {
        warn!(interface, "interface left unprotected");
        Ok(())
    }

    fn release(&mut self) {}
}
