//! Per-board datagram transport.
//!
//! One [`Transport`] is one point-to-point association with one board. The
//! board layer only ever talks to this trait; [`Connector`] implementations
//! decide what is on the other end:
//!
//! - [`udp::UdpConnector`] - connected UDP socket to port 27181, ARP pinning
//! - [`sim::SimConnector`] - in-process LBP16 board emulator with fault
//!   injection and call counting
//!
//! # Timing Contracts
//!
//! | Operation | Max Duration | RT Constraint |
//! |-----------|--------------|---------------|
//! | `send()` | send timeout (10 µs) | **HARD** |
//! | `recv()` | receive timeout (10 µs) | **HARD** |
//! | `recv_with_deadline()` | caller deadline + one poll interval | **HARD** |
//! | `pin_hw_addr()` | unbounded (ioctl) | None (bring-up only) |
//! | `close()` | unbounded | None (teardown only) |

pub mod arp;
pub mod sim;
pub mod udp;

use crate::deadline::poll_until;
use anyio_common::consts::{POLL_INTERVAL_US, RECV_TIMEOUT_US, SEND_TIMEOUT_US};
use anyio_common::llio::interface::LlioError;
use anyio_common::llio::types::MacAddr;
use std::net::SocketAddrV4;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Association with the board could not be set up.
    #[error("cannot open transport to {peer}: {reason}")]
    Open {
        /// Board endpoint.
        peer: SocketAddrV4,
        /// OS or emulator reason.
        reason: String,
    },

    /// Datagram could not be sent.
    #[error("send failed: {0}")]
    Send(String),

    /// Datagram was only partially sent.
    #[error("short send: {sent} of {expected} bytes")]
    ShortSend {
        /// Bytes handed to the network.
        sent: usize,
        /// Datagram length.
        expected: usize,
    },

    /// Receive failed with something other than "no data yet".
    #[error("receive failed: {0}")]
    Recv(String),

    /// No datagram before the deadline.
    #[error("no reply after {tries} attempts in {waited_us}us")]
    Timeout {
        /// Receive attempts made.
        tries: u32,
        /// Time spent polling.
        waited_us: u64,
    },

    /// Local network interfaces could not be listed.
    #[error("interface lookup failed: {0}")]
    Interface(String),

    /// Pinning or unpinning the hardware address failed.
    #[error("hardware address pinning failed: {0}")]
    HwAddr(String),

    /// Transport was already closed.
    #[error("transport closed")]
    Closed,
}

impl From<TransportError> for LlioError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { tries, waited_us } => LlioError::Timeout { tries, waited_us },
            TransportError::Send(_) | TransportError::ShortSend { .. } => {
                LlioError::SendFailed(err.to_string())
            }
            other => LlioError::Transport(other.to_string()),
        }
    }
}

/// Socket timing applied when a transport is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTiming {
    /// Socket send timeout.
    pub send_timeout: Duration,
    /// Socket receive timeout.
    pub recv_timeout: Duration,
    /// Delay between receive attempts in `recv_with_deadline()`.
    pub poll_interval: Duration,
}

impl Default for TransportTiming {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_micros(SEND_TIMEOUT_US),
            recv_timeout: Duration::from_micros(RECV_TIMEOUT_US),
            poll_interval: Duration::from_micros(POLL_INTERVAL_US),
        }
    }
}

/// Point-to-point datagram association with one board.
pub trait Transport: Send {
    /// Board endpoint.
    fn peer(&self) -> SocketAddrV4;

    /// Send one datagram; returns the bytes sent.
    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;

    /// Receive one datagram into `buf`.
    ///
    /// Returns `Ok(None)` if nothing arrived within the receive timeout.
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError>;

    /// Delay between attempts in `recv_with_deadline()`.
    fn poll_interval(&self) -> Duration {
        Duration::from_micros(POLL_INTERVAL_US)
    }

    /// Receive one datagram, polling until `deadline`.
    ///
    /// # Errors
    /// `TransportError::Timeout` with the attempt count and time waited.
    fn recv_with_deadline(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize, TransportError> {
        let interval = self.poll_interval();
        let polled = poll_until(deadline, interval, || self.recv(buf))?;
        match polled.value {
            Some(len) => {
                tracing::trace!(
                    peer = %self.peer(),
                    len,
                    tries = polled.tries,
                    waited_us = polled.elapsed.as_micros() as u64,
                    "reply received"
                );
                Ok(len)
            }
            None => Err(TransportError::Timeout {
                tries: polled.tries,
                waited_us: polled.elapsed.as_micros() as u64,
            }),
        }
    }

    /// Pin the board's hardware address so no address resolution traffic
    /// happens during real-time operation.
    fn pin_hw_addr(&mut self, hw_addr: MacAddr) -> Result<(), TransportError>;

    /// Name of the local interface the board is reached through.
    fn local_interface(&self) -> Option<String>;

    /// Remove the pinned address and release the socket.
    ///
    /// Safe on partially opened or already closed transports.
    fn close(&mut self);
}

/// Opens transports to boards.
pub trait Connector {
    /// Open a transport to `peer`.
    fn connect(&mut self, peer: SocketAddrV4, timing: &TransportTiming) -> Result<Box<dyn Transport>, TransportError>;
}
