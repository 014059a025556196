//! Connected UDP transport to a real board.

use super::{Connector, Transport, TransportError, TransportTiming, arp};
use anyio_common::llio::types::MacAddr;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::os::fd::AsRawFd;
use std::time::Duration;
use tracing::{debug, warn};

/// UDP socket connected to one board.
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    peer: SocketAddrV4,
    interface: Option<String>,
    pinned: bool,
    poll_interval: Duration,
}

impl UdpTransport {
    /// Bind an ephemeral port, connect it to `peer` and apply `timing`.
    pub fn open(peer: SocketAddrV4, timing: &TransportTiming) -> Result<Self, TransportError> {
        let open_err = |e: std::io::Error| TransportError::Open {
            peer,
            reason: e.to_string(),
        };

        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).map_err(open_err)?;
        socket.connect(peer).map_err(open_err)?;
        socket.set_write_timeout(Some(timing.send_timeout)).map_err(open_err)?;
        socket.set_read_timeout(Some(timing.recv_timeout)).map_err(open_err)?;

        let interface = match socket.local_addr().map_err(open_err)? {
            std::net::SocketAddr::V4(local) => arp::interface_for(*local.ip())?,
            std::net::SocketAddr::V6(_) => None,
        };
        debug!(%peer, interface = ?interface, "UDP transport open");

        Ok(Self {
            socket: Some(socket),
            peer,
            interface,
            pinned: false,
            poll_interval: timing.poll_interval,
        })
    }

    fn socket(&self) -> Result<&UdpSocket, TransportError> {
        self.socket.as_ref().ok_or(TransportError::Closed)
    }
}

impl Transport for UdpTransport {
    fn peer(&self) -> SocketAddrV4 {
        self.peer
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let sent = self
            .socket()?
            .send(bytes)
            .map_err(|e| TransportError::Send(e.to_string()))?;
        if sent != bytes.len() {
            return Err(TransportError::ShortSend {
                sent,
                expected: bytes.len(),
            });
        }
        Ok(sent)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        match self.socket()?.recv(buf) {
            Ok(len) => Ok(Some(len)),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(e) => Err(TransportError::Recv(e.to_string())),
        }
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn pin_hw_addr(&mut self, hw_addr: MacAddr) -> Result<(), TransportError> {
        let dev = self
            .interface
            .clone()
            .ok_or_else(|| TransportError::HwAddr(format!("no local interface reaches {}", self.peer)))?;
        let fd = self.socket()?.as_raw_fd();
        arp::pin(fd, &dev, *self.peer.ip(), hw_addr)?;
        self.pinned = true;
        debug!(peer = %self.peer, %hw_addr, dev = %dev, "hardware address pinned");
        Ok(())
    }

    fn local_interface(&self) -> Option<String> {
        self.interface.clone()
    }

    fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            if self.pinned {
                if let Some(dev) = self.interface.as_deref() {
                    if let Err(e) = arp::unpin(socket.as_raw_fd(), dev, *self.peer.ip()) {
                        warn!(peer = %self.peer, "{e}");
                    }
                }
                self.pinned = false;
            }
            debug!(peer = %self.peer, "UDP transport closed");
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens [`UdpTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpConnector;

impl Connector for UdpConnector {
    fn connect(&mut self, peer: SocketAddrV4, timing: &TransportTiming) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(UdpTransport::open(peer, timing)?))
    }
}
