//! Integration tests for the AnyIO Ethernet engine.
//!
//! These tests drive complete sessions against simulated boards: bring-up,
//! queued and immediate register access, loss handling and teardown.

mod integration;
