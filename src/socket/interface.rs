// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Local interface lookup: index, flags and bound addresses.

use std::io;
use std::net::IpAddr;

use super::GroupFamily;

/// Linux interface flags (from if.h)
pub mod interface_flags {
    pub const IFF_UP: u32 = 0x1;
    pub const IFF_LOOPBACK: u32 = 0x8;
    pub const IFF_POINTOPOINT: u32 = 0x10;
    pub const IFF_RUNNING: u32 = 0x40;
    pub const IFF_MULTICAST: u32 = 0x1000;
}

/// A resolved local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub index: u32,
    pub flags: u32,
    /// Addresses in the order the kernel reports them
    pub addresses: Vec<IpAddr>,
}

impl InterfaceInfo {
    pub fn is_up(&self) -> bool {
        self.flags & interface_flags::IFF_UP != 0
    }

    pub fn is_loopback(&self) -> bool {
        self.flags & interface_flags::IFF_LOOPBACK != 0
    }

    pub fn is_multicast(&self) -> bool {
        self.flags & interface_flags::IFF_MULTICAST != 0
    }

    /// Why joins or sends on this interface may not work, if anything.
    ///
    /// Loopback never carries IFF_MULTICAST on Linux yet still delivers
    /// locally joined groups, so it is only flagged when down.
    pub fn multicast_unsupported_reason(&self) -> Option<String> {
        if !self.is_up() {
            Some("interface is down".to_string())
        } else if !self.is_multicast() && !self.is_loopback() {
            if self.flags & interface_flags::IFF_POINTOPOINT != 0 {
                Some("point-to-point interface without multicast support".to_string())
            } else {
                Some("interface lacks IFF_MULTICAST flag".to_string())
            }
        } else {
            None
        }
    }

    /// First address of `family`, used as the sender's source address
    pub fn source_address(&self, family: GroupFamily) -> Option<IpAddr> {
        self.addresses
            .iter()
            .copied()
            .find(|addr| GroupFamily::of(*addr) == family)
    }
}

impl std::fmt::Display for InterfaceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use interface_flags::*;

        let mut flags = Vec::new();
        if self.flags & IFF_UP != 0 {
            flags.push("UP");
        }
        if self.flags & IFF_RUNNING != 0 {
            flags.push("RUNNING");
        }
        if self.flags & IFF_MULTICAST != 0 {
            flags.push("MULTICAST");
        }
        if self.flags & IFF_LOOPBACK != 0 {
            flags.push("LOOPBACK");
        }
        write!(f, "{} (index {}): <{}>", self.name, self.index, flags.join(","))
    }
}

/// All interfaces on this host
pub fn list_interfaces() -> Vec<InterfaceInfo> {
    pnet::datalink::interfaces()
        .into_iter()
        .map(|iface| InterfaceInfo {
            addresses: iface.ips.iter().map(|net| net.ip()).collect(),
            name: iface.name,
            index: iface.index,
            flags: iface.flags,
        })
        .collect()
}

pub fn resolve_interface(name: &str) -> io::Result<InterfaceInfo> {
    list_interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("interface not found: {}", name),
            )
        })
}
