// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Validation rules shared by the receiver config file and the sender's
//! command-line group specs.

use std::net::IpAddr;

/// Maximum interface name length (Linux IFNAMSIZ - 1)
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

pub type ValidationResult = Result<(), String>;

/// Validate an interface name according to Linux kernel rules.
///
/// # Rules
/// - Must not be empty
/// - Must not exceed 15 characters (IFNAMSIZ - 1)
/// - Must contain only alphanumeric characters, dash, underscore, or dot
/// - Must not start with a digit, dash, or dot
pub fn validate_interface_name(name: &str) -> ValidationResult {
    if name.is_empty() {
        return Err("interface name cannot be empty".to_string());
    }

    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(format!(
            "interface name '{}' exceeds maximum length of {} characters",
            name, MAX_INTERFACE_NAME_LEN
        ));
    }

    if let Some((i, c)) = name
        .chars()
        .enumerate()
        .find(|(_, c)| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_' && *c != '.')
    {
        return Err(format!(
            "interface name '{}' contains invalid character '{}' at position {}",
            name, c, i
        ));
    }

    match name.chars().next() {
        Some(first) if first.is_ascii_digit() => Err(format!(
            "interface name '{}' cannot start with a digit",
            name
        )),
        Some(first) if first == '-' || first == '.' => Err(format!(
            "interface name '{}' cannot start with '{}'",
            name, first
        )),
        _ => Ok(()),
    }
}

/// Port 0 is legal UDP but can never be joined or targeted meaningfully.
pub fn validate_port(port: u16, context: &str) -> ValidationResult {
    if port == 0 {
        return Err(format!(
            "{} cannot be 0; valid port range is 1-65535",
            context
        ));
    }
    Ok(())
}

/// The group must be a multicast address of its own family
/// (224.0.0.0/4 for IPv4, ff00::/8 for IPv6).
pub fn validate_multicast_address(addr: IpAddr, context: &str) -> ValidationResult {
    if canonical_address(addr).is_multicast() {
        Ok(())
    } else {
        Err(format!(
            "{} must be a multicast address, got {}",
            context, addr
        ))
    }
}

/// Collapse IPv4-mapped IPv6 (`::ffff:a.b.c.d`) to plain IPv4.
pub fn canonical_address(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => addr,
        },
        IpAddr::V4(_) => addr,
    }
}
