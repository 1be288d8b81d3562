// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Socket option plans.
//!
//! The family-specific setup of a receiver or sender socket is first built
//! as a list of [`SocketOption`]s and only then applied, so which options a
//! group requests can be checked without touching the network.

use socket2::{InterfaceIndexOrAddress, Socket};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::io::{AsRawFd, RawFd};

use super::interface::InterfaceInfo;
use crate::validation::canonical_address;
use super::GroupFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOption {
    /// SO_REUSEADDR, so several groups can share one port
    ReuseAddress,
    /// SO_REUSEPORT
    ReusePort,
    /// IP_ADD_MEMBERSHIP with an ip_mreqn naming the interface index
    JoinV4 { group: Ipv4Addr, interface_index: u32 },
    /// IPV6_JOIN_GROUP
    JoinV6 { group: Ipv6Addr, interface_index: u32 },
    /// IP_PKTINFO: report each datagram's destination address
    PacketInfoV4,
    /// IPV6_RECVPKTINFO
    PacketInfoV6,
    /// IP_MULTICAST_TTL
    MulticastTtlV4(u32),
    /// IPV6_MULTICAST_HOPS
    MulticastHopsV6(u32),
    /// IP_MULTICAST_IF by local address
    MulticastInterfaceV4(Ipv4Addr),
    /// IPV6_MULTICAST_IF by interface index
    MulticastInterfaceV6(u32),
    /// IP_MULTICAST_LOOP
    MulticastLoopV4(bool),
    /// IPV6_MULTICAST_LOOP
    MulticastLoopV6(bool),
}

impl SocketOption {
    /// Options that only take effect when set before bind(2)
    pub fn is_pre_bind(&self) -> bool {
        matches!(self, SocketOption::ReuseAddress | SocketOption::ReusePort)
    }
}

/// Where to bind and what to set on the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketPlan {
    pub family: GroupFamily,
    pub bind: SocketAddr,
    pub options: Vec<SocketOption>,
}

impl SocketPlan {
    pub fn pre_bind(&self) -> impl Iterator<Item = &SocketOption> {
        self.options.iter().filter(|o| o.is_pre_bind())
    }

    pub fn post_bind(&self) -> impl Iterator<Item = &SocketOption> {
        self.options.iter().filter(|o| !o.is_pre_bind())
    }
}

/// Bind to `group:port`, join on `interface`, ask for destination info
pub fn receiver_plan(group: IpAddr, port: u16, interface: &InterfaceInfo) -> SocketPlan {
    let family = GroupFamily::of(group);
    let mut options = vec![SocketOption::ReuseAddress, SocketOption::ReusePort];

    let bind = match canonical_address(group) {
        IpAddr::V4(group) => {
            options.push(SocketOption::JoinV4 {
                group,
                interface_index: interface.index,
            });
            options.push(SocketOption::PacketInfoV4);
            SocketAddr::V4(SocketAddrV4::new(group, port))
        }
        IpAddr::V6(group) => {
            options.push(SocketOption::JoinV6 {
                group,
                interface_index: interface.index,
            });
            options.push(SocketOption::PacketInfoV6);
            SocketAddr::V6(SocketAddrV6::new(
                group,
                port,
                0,
                multicast_scope_id(group, interface.index),
            ))
        }
    };

    SocketPlan {
        family,
        bind,
        options,
    }
}

/// Bind to `source:0` and steer multicast out of `interface`
pub fn sender_plan(source: IpAddr, interface: &InterfaceInfo, ttl: u32) -> SocketPlan {
    let family = GroupFamily::of(source);
    let (bind, options) = match canonical_address(source) {
        IpAddr::V6(addr) => (
            SocketAddr::V6(SocketAddrV6::new(
                addr,
                0,
                0,
                unicast_scope_id(addr, interface.index),
            )),
            vec![
                SocketOption::MulticastInterfaceV6(interface.index),
                SocketOption::MulticastHopsV6(ttl),
                SocketOption::MulticastLoopV6(true),
            ],
        ),
        IpAddr::V4(addr) => (
            SocketAddr::V4(SocketAddrV4::new(addr, 0)),
            vec![
                SocketOption::MulticastInterfaceV4(addr),
                SocketOption::MulticastTtlV4(ttl),
                SocketOption::MulticastLoopV4(true),
            ],
        ),
    };

    SocketPlan {
        family,
        bind,
        options,
    }
}

/// Interface- and link-local multicast scopes (ffx1, ffx2) need a scope id
pub fn multicast_scope_id(group: Ipv6Addr, interface_index: u32) -> u32 {
    match group.segments()[0] & 0x000f {
        0x1 | 0x2 => interface_index,
        _ => 0,
    }
}

/// Link-local unicast sources (fe80::/10) need a scope id
pub fn unicast_scope_id(addr: Ipv6Addr, interface_index: u32) -> u32 {
    if addr.segments()[0] & 0xffc0 == 0xfe80 {
        interface_index
    } else {
        0
    }
}

pub fn apply_option(socket: &Socket, option: &SocketOption) -> io::Result<()> {
    match *option {
        SocketOption::ReuseAddress => socket.set_reuse_address(true),
        SocketOption::ReusePort => socket.set_reuse_port(true),
        SocketOption::JoinV4 {
            group,
            interface_index,
        } => socket.join_multicast_v4_n(&group, &InterfaceIndexOrAddress::Index(interface_index)),
        SocketOption::JoinV6 {
            group,
            interface_index,
        } => socket.join_multicast_v6(&group, interface_index),
        SocketOption::PacketInfoV4 => {
            set_int_option(socket.as_raw_fd(), libc::IPPROTO_IP, libc::IP_PKTINFO, 1)
        }
        SocketOption::PacketInfoV6 => set_int_option(
            socket.as_raw_fd(),
            libc::IPPROTO_IPV6,
            libc::IPV6_RECVPKTINFO,
            1,
        ),
        SocketOption::MulticastTtlV4(ttl) => socket.set_multicast_ttl_v4(ttl),
        SocketOption::MulticastHopsV6(hops) => socket.set_multicast_hops_v6(hops),
        SocketOption::MulticastInterfaceV4(addr) => socket.set_multicast_if_v4(&addr),
        SocketOption::MulticastInterfaceV6(index) => socket.set_multicast_if_v6(index),
        SocketOption::MulticastLoopV4(enabled) => socket.set_multicast_loop_v4(enabled),
        SocketOption::MulticastLoopV6(enabled) => socket.set_multicast_loop_v6(enabled),
    }
}

fn set_int_option(fd: RawFd, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> io::Result<()> {
    let result = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
