//! Process-wide communication gate.
//!
//! Every board entry point checks the gate first and returns a benign
//! success without touching the network while it is closed. The session
//! opens it once every board is registered and closes it before any
//! transport is torn down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared on/off switch for all board I/O.
#[derive(Debug, Clone, Default)]
pub struct CommGate {
    open: Arc<AtomicBool>,
}

impl CommGate {
    /// Closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow I/O.
    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Stop all I/O.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// True while I/O is allowed.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
