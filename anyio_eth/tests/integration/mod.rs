//! Shared fixtures: simulated network, recording registrar and guard.

mod bring_up;
mod degraded_link;
mod queued_io;

use anyio_common::llio::interface::{RegisterError, Registrar};
use anyio_common::llio::types::{BoardSummary, MacAddr};
use anyio_common::prelude::DEFAULT_IMMEDIATE_TIMEOUT;
use anyio_eth::guard::{GuardError, NetworkGuard};
use anyio_eth::session::{BoardRequest, BringUp, EthSession};
use anyio_eth::transport::TransportTiming;
use anyio_eth::transport::sim::{SimConnector, SimHandle};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const IMMEDIATE_TIMEOUT: Duration = DEFAULT_IMMEDIATE_TIMEOUT;

pub fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 10, 10, last)
}

pub fn mac(last: u8) -> MacAddr {
    MacAddr([0x00, 0x60, 0x1B, 0x10, 0x00, last])
}

pub fn request(last: u8) -> BoardRequest {
    BoardRequest {
        ip: ip(last),
        config: format!("num_encoders={last}"),
    }
}

/// Network with one board per `(last octet, identification string)`.
pub fn network(boards: &[(u8, &str)]) -> SimConnector {
    let mut connector = SimConnector::new();
    for &(last, name) in boards {
        connector.add_board(ip(last), SimHandle::new(name, mac(last)));
    }
    connector
}

pub fn bring_up() -> BringUp {
    BringUp::new(TransportTiming::default(), IMMEDIATE_TIMEOUT)
}

/// Registrar that records calls and can reject one board by name.
#[derive(Default)]
pub struct RecordingRegistrar {
    pub seen: Vec<(BoardSummary, String)>,
    pub reject: Option<String>,
}

impl Registrar for RecordingRegistrar {
    fn register(&mut self, summary: &BoardSummary, config: &str) -> Result<(), RegisterError> {
        self.seen.push((summary.clone(), config.to_string()));
        if self.reject.as_deref() == Some(summary.name.as_str()) {
            return Err(RegisterError {
                board: summary.name.clone(),
                code: -22,
                reason: "rejected by test".to_string(),
            });
        }
        Ok(())
    }
}

/// What a [`RecordingGuard`] was asked to do.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GuardLog {
    pub prepared: u32,
    pub protected: Vec<String>,
    pub released: u32,
}

/// Guard that records calls into a shared log.
#[derive(Clone, Default)]
pub struct RecordingGuard {
    pub log: Arc<Mutex<GuardLog>>,
    pub refuse: bool,
}

impl RecordingGuard {
    pub fn log(&self) -> GuardLog {
        self.log.lock().unwrap().clone()
    }
}

impl NetworkGuard for RecordingGuard {
    fn prepare(&mut self) -> Result<(), GuardError> {
        self.log.lock().unwrap().prepared += 1;
        if self.refuse {
            return Err(GuardError {
                scope: "host".to_string(),
                reason: "refused by test".to_string(),
            });
        }
        Ok(())
    }

    fn protect_interface(&mut self, interface: &str) -> Result<(), GuardError> {
        self.log.lock().unwrap().protected.push(interface.to_string());
        Ok(())
    }

    fn release(&mut self) {
        self.log.lock().unwrap().released += 1;
    }
}

/// Active session over `boards`, all accepted.
pub fn active_session(boards: &[(u8, &str)]) -> (SimConnector, EthSession) {
    let mut connector = network(boards);
    let requests: Vec<_> = boards.iter().map(|&(last, _)| request(last)).collect();
    let session = bring_up()
        .run(
            &requests,
            &mut connector,
            &mut RecordingRegistrar::default(),
            Box::new(RecordingGuard::default()),
        )
        .unwrap();
    (connector, session)
}
