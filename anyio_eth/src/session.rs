//! Multi-board bring-up and teardown.
//!
//! Bring-up is all-or-nothing: every configured board is connected,
//! identified and registered in order, and the [`CommGate`] opens only
//! after the last one is registered. Any failure closes every board opened
//! so far and releases the network guard.
//!
//! # Board States
//!
//! ```text
//! Unconnected ──► Connected ──► Identified ──► Registered ──► Active
//!      │              │              │              │            │
//!      └──────────────┴──────────────┴──────► Failed             ▼
//!                                                             Closed
//! ```

use crate::board::{Board, BoardLink, PacketCounters};
use crate::error::EthError;
use crate::gate::CommGate;
use crate::guard::NetworkGuard;
use crate::registry::BoardRegistry;
use crate::transport::{Connector, TransportTiming};
use anyio_common::consts::IMMEDIATE_TIMEOUT_MS;
use anyio_common::llio::interface::{LowLevelIo, Registrar};
use anyio_common::llio::types::{BoardSummary, ExecContext};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{error, info};

/// Lifecycle state of one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet contacted.
    Unconnected,
    /// Transport open, hardware address pinned.
    Connected,
    /// Profile resolved.
    Identified,
    /// Accepted by the register framework.
    Registered,
    /// Gate open, I/O flowing.
    Active,
    /// Torn down after a successful bring-up.
    Closed,
    /// Torn down by a failed bring-up.
    Failed,
}

/// Index of a board inside its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoardHandle(usize);

impl BoardHandle {
    /// Position in bring-up order.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// One board to bring up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardRequest {
    /// Board address.
    pub ip: Ipv4Addr,
    /// Configuration string handed to the registrar.
    pub config: String,
}

/// Bring-up driver.
///
/// Owns the board registry so instance names stay unique across every
/// session it starts.
pub struct BringUp {
    registry: BoardRegistry,
    timing: TransportTiming,
    immediate_timeout: Duration,
}

impl Default for BringUp {
    fn default() -> Self {
        Self::new(
            TransportTiming::default(),
            Duration::from_millis(IMMEDIATE_TIMEOUT_MS),
        )
    }
}

impl BringUp {
    /// Driver with the given socket timing and immediate-read timeout.
    pub fn new(timing: TransportTiming, immediate_timeout: Duration) -> Self {
        Self {
            registry: BoardRegistry::new(),
            timing,
            immediate_timeout,
        }
    }

    /// Bring every board in `requests` to `Active`, or none of them.
    ///
    /// # Errors
    /// The first failure; all boards opened so far are closed and the
    /// guard is released before it is returned.
    pub fn run(
        &mut self,
        requests: &[BoardRequest],
        connector: &mut dyn Connector,
        registrar: &mut dyn Registrar,
        guard: Box<dyn NetworkGuard>,
    ) -> Result<EthSession, EthError> {
        let mut session = EthSession {
            boards: Vec::with_capacity(requests.len()),
            states: Vec::with_capacity(requests.len()),
            gate: CommGate::new(),
            guard,
            protected: HashSet::new(),
            shut_down: false,
        };

        match self.bring_up_all(&mut session, requests, connector, registrar) {
            Ok(()) => {
                session.gate.open();
                session.states.iter_mut().for_each(|s| *s = SessionState::Active);
                info!(boards = session.boards.len(), "all boards active");
                Ok(session)
            }
            Err(e) => {
                error!("bring-up failed: {e}");
                session.teardown(SessionState::Failed);
                Err(e)
            }
        }
    }

    fn bring_up_all(
        &mut self,
        session: &mut EthSession,
        requests: &[BoardRequest],
        connector: &mut dyn Connector,
        registrar: &mut dyn Registrar,
    ) -> Result<(), EthError> {
        if requests.is_empty() {
            return Err(EthError::NoBoards);
        }
        session.guard.prepare()?;

        for (index, request) in requests.iter().enumerate() {
            let ip = request.ip;
            session.states.push(SessionState::Unconnected);
            let mut link = BoardLink::open(connector, ip, &self.timing, self.immediate_timeout)
                .map_err(|source| EthError::Transport { ip, source })?;

            // Partially opened links are closed on every error path below.
            let hw_addr = match link.connect_hw_addr() {
                Ok(hw_addr) => hw_addr,
                Err(source) => {
                    link.close();
                    return Err(EthError::Identify { ip, source });
                }
            };
            session.states[index] = SessionState::Connected;
            if let Some(interface) = link.local_interface() {
                if !session.protected.contains(&interface) {
                    if let Err(e) = session.guard.protect_interface(&interface) {
                        link.close();
                        return Err(e.into());
                    }
                    session.protected.insert(interface);
                }
            }
            info!(%ip, %hw_addr, "board connected");

            let identity = link.identify().and_then(|board_name| {
                let identity = self
                    .registry
                    .identify(&board_name, |address, buf| link.read_registers(address, buf))?;
                Ok((board_name, identity))
            });
            let (board_name, identity) = match identity {
                Ok(found) => found,
                Err(source) => {
                    link.close();
                    return Err(EthError::Identify { ip, source });
                }
            };

            let summary = BoardSummary {
                name: identity.name,
                board_name,
                address: ip,
                hw_addr,
                profile: identity.profile,
                recognized: identity.recognized,
            };
            session.boards.push(Board::new(link, summary, session.gate.clone()));
            session.states[index] = SessionState::Identified;
        }

        for (index, request) in requests.iter().enumerate() {
            registrar.register(session.boards[index].summary(), &request.config)?;
            session.states[index] = SessionState::Registered;
            info!(board = %session.boards[index].name(), "board registered");
        }
        Ok(())
    }
}

/// Every board of one bring-up.
pub struct EthSession {
    boards: Vec<Board>,
    states: Vec<SessionState>,
    gate: CommGate,
    guard: Box<dyn NetworkGuard>,
    protected: HashSet<String>,
    shut_down: bool,
}

impl EthSession {
    /// Number of boards.
    pub fn len(&self) -> usize {
        self.boards.len()
    }

    /// True if the session holds no boards.
    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Handles in bring-up order.
    pub fn handles(&self) -> impl Iterator<Item = BoardHandle> + use<> {
        (0..self.boards.len()).map(BoardHandle)
    }

    /// Board behind `handle`.
    pub fn board(&self, handle: BoardHandle) -> Result<&Board, EthError> {
        self.boards.get(handle.0).ok_or(EthError::InvalidHandle(handle.0))
    }

    /// Mutable board behind `handle`.
    pub fn board_mut(&mut self, handle: BoardHandle) -> Result<&mut Board, EthError> {
        self.boards
            .get_mut(handle.0)
            .ok_or(EthError::InvalidHandle(handle.0))
    }

    /// All boards, in bring-up order.
    pub fn boards_mut(&mut self) -> &mut [Board] {
        &mut self.boards
    }

    /// State of the board behind `handle`.
    pub fn state(&self, handle: BoardHandle) -> Result<SessionState, EthError> {
        self.states
            .get(handle.0)
            .copied()
            .ok_or(EthError::InvalidHandle(handle.0))
    }

    /// Handle of the board with instance name `name`.
    pub fn find(&self, name: &str) -> Option<BoardHandle> {
        self.boards.iter().position(|b| b.name() == name).map(BoardHandle)
    }

    /// Board summaries in bring-up order.
    pub fn summaries(&self) -> Vec<BoardSummary> {
        self.boards.iter().map(|b| b.summary().clone()).collect()
    }

    /// Packet counters per board.
    pub fn counters(&self) -> Vec<(String, PacketCounters)> {
        self.boards
            .iter()
            .map(|b| (b.name().to_string(), b.counters()))
            .collect()
    }

    /// The gate shared by every board of this session.
    pub fn gate(&self) -> CommGate {
        self.gate.clone()
    }

    /// Switch every board to `context`.
    pub fn set_context(&mut self, context: ExecContext) {
        self.boards.iter_mut().for_each(|b| b.set_context(context));
    }

    /// Close the gate, close every board, release the guard.
    ///
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        for (board, counters) in self.counters() {
            info!(
                board = %board,
                read_packets = counters.read_packets,
                write_packets = counters.write_packets,
                discarded = counters.batches_discarded,
                "board statistics"
            );
        }
        self.teardown(SessionState::Closed);
        info!("session closed");
    }

    fn teardown(&mut self, terminal: SessionState) {
        self.gate.close();
        for board in &mut self.boards {
            board.close();
        }
        self.states.iter_mut().for_each(|s| *s = terminal);
        self.guard.release();
        self.shut_down = true;
    }
}

impl Drop for EthSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
