//! Host ARP table pinning and local interface lookup.
//!
//! A permanent ARP entry for every board keeps address resolution traffic
//! off the wire once the control cycle runs. Needs `CAP_NET_ADMIN`.

use super::TransportError;
use anyio_common::llio::types::MacAddr;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::RawFd;

// <net/if_arp.h> flags, not exported by libc.
#[cfg(target_os = "linux")]
const ATF_COM: libc::c_int = 0x02;
#[cfg(target_os = "linux")]
const ATF_PERM: libc::c_int = 0x04;

/// Name of the local interface carrying address `local`.
pub fn interface_for(local: Ipv4Addr) -> Result<Option<String>, TransportError> {
    let addrs = nix::ifaddrs::getifaddrs().map_err(|e| TransportError::Interface(format!("getifaddrs: {e}")))?;
    for ifa in addrs {
        let Some(address) = ifa.address else { continue };
        let Some(sin) = address.as_sockaddr_in() else { continue };
        if *SocketAddrV4::from(*sin).ip() == local {
            return Ok(Some(ifa.interface_name));
        }
    }
    Ok(None)
}

#[cfg(target_os = "linux")]
fn request(dev: &str, ip: Ipv4Addr) -> libc::arpreq {
    // SAFETY: arpreq is plain old data, all-zero is a valid value.
    let mut req: libc::arpreq = unsafe { std::mem::zeroed() };

    let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_addr.s_addr = u32::from(ip).to_be();
    // SAFETY: sockaddr_in and sockaddr have the same size on Linux.
    req.arp_pa = unsafe { std::mem::transmute::<libc::sockaddr_in, libc::sockaddr>(sin) };

    for (dst, src) in req.arp_dev.iter_mut().zip(dev.bytes().take(libc::IFNAMSIZ - 1)) {
        *dst = src as libc::c_char;
    }
    req
}

/// Add a permanent ARP entry `ip -> hw_addr` on interface `dev`.
#[cfg(target_os = "linux")]
pub fn pin(fd: RawFd, dev: &str, ip: Ipv4Addr, hw_addr: MacAddr) -> Result<(), TransportError> {
    let mut req = request(dev, ip);
    req.arp_ha.sa_family = libc::ARPHRD_ETHER as libc::sa_family_t;
    for (dst, src) in req.arp_ha.sa_data.iter_mut().zip(hw_addr.octets()) {
        *dst = src as libc::c_char;
    }
    req.arp_flags = ATF_PERM | ATF_COM;

    // SAFETY: fd is an open socket and req outlives the call.
    let rc = unsafe { libc::ioctl(fd, libc::SIOCSARP as _, &mut req as *mut libc::arpreq) };
    if rc < 0 {
        return Err(TransportError::HwAddr(format!(
            "SIOCSARP {ip} on {dev}: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Remove the ARP entry for `ip` on interface `dev`.
#[cfg(target_os = "linux")]
pub fn unpin(fd: RawFd, dev: &str, ip: Ipv4Addr) -> Result<(), TransportError> {
    let mut req = request(dev, ip);
    // SAFETY: fd is an open socket and req outlives the call.
    let rc = unsafe { libc::ioctl(fd, libc::SIOCDARP as _, &mut req as *mut libc::arpreq) };
    if rc < 0 {
        return Err(TransportError::HwAddr(format!(
            "SIOCDARP {ip} on {dev}: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// ARP pinning is only implemented for Linux.
#[cfg(not(target_os = "linux"))]
pub fn pin(_fd: RawFd, dev: &str, ip: Ipv4Addr, _hw_addr: MacAddr) -> Result<(), TransportError> {
    Err(TransportError::HwAddr(format!(
        "cannot pin {ip} on {dev}: unsupported platform"
    )))
}

/// ARP pinning is only implemented for Linux.
#[cfg(not(target_os = "linux"))]
pub fn unpin(_fd: RawFd, _dev: &str, _ip: Ipv4Addr) -> Result<(), TransportError> {
    Ok(())
}
