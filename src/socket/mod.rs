// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Per-group UDP sockets.
//!
//! A group's address family decides every option: IPv4 groups get
//! IP_ADD_MEMBERSHIP / IP_PKTINFO / IP_MULTICAST_*, IPv6 groups the IPV6_*
//! equivalents. The options are planned in [`options`] and applied here.

pub mod interface;
mod options;
mod pktinfo;

pub use interface::{list_interfaces, resolve_interface, InterfaceInfo};
pub use options::{
    multicast_scope_id, receiver_plan, sender_plan, unicast_scope_id, SocketOption, SocketPlan,
};

use socket2::{Domain, InterfaceIndexOrAddress, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::os::unix::io::AsRawFd;
use tokio::io::Interest;
use tokio::net::UdpSocket;

use crate::error::{ErrorKind, GroupError, GroupResultExt};
use crate::validation::canonical_address;
use crate::MulticastGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupFamily {
    V4,
    V6,
}

impl GroupFamily {
    /// IPv4-mapped IPv6 addresses count as IPv4
    pub fn of(addr: IpAddr) -> Self {
        match canonical_address(addr) {
            IpAddr::V4(_) => GroupFamily::V4,
            IpAddr::V6(_) => GroupFamily::V6,
        }
    }

    pub fn domain(self) -> Domain {
        match self {
            GroupFamily::V4 => Domain::IPV4,
            GroupFamily::V6 => Domain::IPV6,
        }
    }
}

impl std::fmt::Display for GroupFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupFamily::V4 => write!(f, "IPv4"),
            GroupFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// One received datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram {
    pub len: usize,
    pub source: SocketAddr,
    /// Destination from the packet-info control message, if the kernel sent one
    pub destination: Option<IpAddr>,
}

/// Create a UDP socket, apply `plan` around bind(2), and hand it to tokio
fn build_socket(plan: &SocketPlan) -> Result<UdpSocket, GroupError> {
    let socket = Socket::new(plan.family.domain(), Type::DGRAM, Some(Protocol::UDP))
        .group_context(ErrorKind::Socket, || format!("create {} UDP socket", plan.family))?;

    for option in plan.pre_bind() {
        options::apply_option(&socket, option)
            .group_context(ErrorKind::Socket, || format!("set {:?}", option))?;
    }

    socket
        .bind(&plan.bind.into())
        .group_context(ErrorKind::Socket, || format!("bind {}", plan.bind))?;

    for option in plan.post_bind() {
        options::apply_option(&socket, option)
            .group_context(ErrorKind::Socket, || format!("set {:?}", option))?;
    }

    socket
        .set_nonblocking(true)
        .group_context(ErrorKind::Socket, || "set non-blocking")?;

    UdpSocket::from_std(socket.into())
        .group_context(ErrorKind::Socket, || "register socket with runtime")
}

/// A socket joined to one multicast group on one interface.
///
/// The membership is dropped with the socket; [`ReceiverSocket::leave`]
/// does it explicitly so the caller can see the result.
#[derive(Debug)]
pub struct ReceiverSocket {
    socket: UdpSocket,
    group: IpAddr,
    interface_index: u32,
    joined: bool,
}

impl ReceiverSocket {
    pub fn open(group: &MulticastGroup, interface: &InterfaceInfo) -> Result<Self, GroupError> {
        let plan = receiver_plan(group.group_address, group.port, interface);
        let socket = build_socket(&plan).map_err(|mut e| {
            e.context = format!("{}: {}", group, e.context);
            e
        })?;

        Ok(Self {
            socket,
            group: canonical_address(group.group_address),
            interface_index: interface.index,
            joined: true,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Wait for the next datagram, with its destination address
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<Datagram> {
        let fd = self.socket.as_raw_fd();
        loop {
            self.socket.readable().await?;
            match self
                .socket
                .try_io(Interest::READABLE, || pktinfo::recv_with_destination(fd, buf))
            {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                result => return result,
            }
        }
    }

    pub fn leave(&mut self) -> io::Result<()> {
        if !self.joined {
            return Ok(());
        }
        self.joined = false;

        let socket = SockRef::from(&self.socket);
        match self.group {
            IpAddr::V4(group) => socket.leave_multicast_v4_n(
                &group,
                &InterfaceIndexOrAddress::Index(self.interface_index),
            ),
            IpAddr::V6(group) => socket.leave_multicast_v6(&group, self.interface_index),
        }
    }
}

impl Drop for ReceiverSocket {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

/// A socket bound to an interface address, sending to one group
#[derive(Debug)]
pub struct SenderSocket {
    socket: UdpSocket,
    source: SocketAddr,
    destination: SocketAddr,
}

impl SenderSocket {
    /// Bind to the first address on `interface` of the group's family
    pub fn open(
        group: &MulticastGroup,
        interface: &InterfaceInfo,
        ttl: u32,
    ) -> Result<Self, GroupError> {
        let family = GroupFamily::of(group.group_address);
        let source_address = interface.source_address(family).ok_or_else(|| {
            GroupError::interface(
                group.to_string(),
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no {} address on interface {}", family, interface.name),
                ),
            )
        })?;

        let plan = sender_plan(source_address, interface, ttl);
        let socket = build_socket(&plan).map_err(|mut e| {
            e.context = format!("{}: {}", group, e.context);
            e
        })?;
        let source = socket
            .local_addr()
            .group_context(ErrorKind::Socket, || format!("{}: read local address", group))?;

        let group_address = canonical_address(group.group_address);
        let destination = match group_address {
            IpAddr::V6(addr) => SocketAddr::V6(std::net::SocketAddrV6::new(
                addr,
                group.port,
                0,
                multicast_scope_id(addr, interface.index),
            )),
            IpAddr::V4(_) => SocketAddr::new(group_address, group.port),
        };

        Ok(Self {
            socket,
            source,
            destination,
        })
    }

    pub fn source(&self) -> SocketAddr {
        self.source
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub async fn send(&self, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, self.destination).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> InterfaceInfo {
        InterfaceInfo {
            name: "lo".to_string(),
            index: 1,
            flags: interface::interface_flags::IFF_UP | interface::interface_flags::IFF_LOOPBACK,
            addresses: vec!["127.0.0.1".parse().unwrap()],
        }
    }

    #[test]
    fn test_group_family() {
        assert_eq!(GroupFamily::of("239.1.1.1".parse().unwrap()), GroupFamily::V4);
        assert_eq!(GroupFamily::of("::ffff:239.1.1.1".parse().unwrap()), GroupFamily::V4);
        assert_eq!(GroupFamily::of("ff03::1".parse().unwrap()), GroupFamily::V6);
        assert_eq!(GroupFamily::V4.domain(), Domain::IPV4);
        assert_eq!(GroupFamily::V6.domain(), Domain::IPV6);
    }

    #[tokio::test]
    async fn test_sender_without_matching_family_fails() {
        let group = MulticastGroup::new("lo", "ff03::1".parse().unwrap(), 5000);
        let err = SenderSocket::open(&group, &loopback(), 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Interface);
        assert!(err.to_string().contains("no IPv6 address on interface lo"));
    }

    #[tokio::test]
    async fn test_sender_binds_interface_address() {
        let group = MulticastGroup::new("lo", "239.5.5.5".parse().unwrap(), 20000);
        let sender = SenderSocket::open(&group, &loopback(), 1).unwrap();
        assert_eq!(sender.source().ip(), "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_ne!(sender.source().port(), 0);
        assert_eq!(sender.destination(), "239.5.5.5:20000".parse().unwrap());
    }
}
