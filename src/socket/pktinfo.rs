// SPDX-License-Identifier: Apache-2.0 OR MIT
//! recvmsg(2) with IP_PKTINFO / IPV6_PKTINFO ancillary data.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::io::RawFd;

use super::Datagram;

/// Room for one in6_pktinfo (20 bytes) plus its cmsghdr, with slack
#[repr(C, align(8))]
struct ControlBuffer([u8; 128]);

/// Read one datagram, returning its source and the destination address the
/// kernel reports in the packet-info control message.
pub fn recv_with_destination(fd: RawFd, buf: &mut [u8]) -> io::Result<Datagram> {
    let mut control = ControlBuffer([0u8; 128]);
    let mut source: libc::sockaddr_storage = unsafe { std::mem::zeroed() };

    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_name = &mut source as *mut libc::sockaddr_storage as *mut libc::c_void;
    msg.msg_namelen = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.0.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = control.0.len() as _;

    let n = unsafe { libc::recvmsg(fd, &mut msg, 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    let source = sockaddr_to_socket_addr(&source).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported source address family {}", source.ss_family),
        )
    })?;

    let mut destination = None;
    let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&msg) };
    while !cmsg.is_null() {
        let header = unsafe { &*cmsg };
        let data = unsafe { libc::CMSG_DATA(cmsg) };
        destination = unsafe { destination_from_cmsg(header.cmsg_level, header.cmsg_type, data) };
        if destination.is_some() {
            break;
        }
        cmsg = unsafe { libc::CMSG_NXTHDR(&msg, cmsg) };
    }

    Ok(Datagram {
        len: n as usize,
        source,
        destination,
    })
}

/// # Safety
///
/// `data` must point at the payload of a control message of the given
/// level and type, as returned by CMSG_DATA.
unsafe fn destination_from_cmsg(level: libc::c_int, kind: libc::c_int, data: *const u8) -> Option<IpAddr> {
    match (level, kind) {
        (libc::IPPROTO_IP, libc::IP_PKTINFO) => {
            let info = std::ptr::read_unaligned(data as *const libc::in_pktinfo);
            Some(IpAddr::V4(Ipv4Addr::from(u32::from_be(info.ipi_addr.s_addr))))
        }
        (libc::IPPROTO_IPV6, libc::IPV6_PKTINFO) => {
            let info = std::ptr::read_unaligned(data as *const libc::in6_pktinfo);
            Some(IpAddr::V6(Ipv6Addr::from(info.ipi6_addr.s6_addr)))
        }
        _ => None,
    }
}

fn sockaddr_to_socket_addr(storage: &libc::sockaddr_storage) -> Option<SocketAddr> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const libc::sockaddr_in) };
            Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)),
                u16::from_be(addr.sin_port),
            )))
        }
        libc::AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const libc::sockaddr_in6) };
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(addr.sin6_addr.s6_addr),
                u16::from_be(addr.sin6_port),
                u32::from_be(addr.sin6_flowinfo),
                addr.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_sockaddr_conversion() {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        {
            let addr = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in) };
            addr.sin_family = libc::AF_INET as libc::sa_family_t;
            addr.sin_port = 5000u16.to_be();
            addr.sin_addr.s_addr = u32::from(Ipv4Addr::new(10, 1, 2, 3)).to_be();
        }

        assert_eq!(
            sockaddr_to_socket_addr(&storage),
            Some("10.1.2.3:5000".parse().unwrap())
        );
    }

    #[test]
    fn test_ipv6_sockaddr_conversion() {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        {
            let addr = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in6) };
            addr.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            addr.sin6_port = 6000u16.to_be();
            addr.sin6_addr.s6_addr = "fe80::1".parse::<Ipv6Addr>().unwrap().octets();
            addr.sin6_scope_id = 4;
        }

        match sockaddr_to_socket_addr(&storage) {
            Some(SocketAddr::V6(addr)) => {
                assert_eq!(*addr.ip(), "fe80::1".parse::<Ipv6Addr>().unwrap());
                assert_eq!(addr.port(), 6000);
                assert_eq!(addr.scope_id(), 4);
            }
            other => panic!("expected IPv6 address, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_family_is_rejected() {
        let storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        assert_eq!(sockaddr_to_socket_addr(&storage), None);
    }

    #[test]
    fn test_pktinfo_payloads() {
        let mut v4: libc::in_pktinfo = unsafe { std::mem::zeroed() };
        v4.ipi_addr.s_addr = u32::from(Ipv4Addr::new(239, 1, 1, 1)).to_be();
        let got = unsafe {
            destination_from_cmsg(libc::IPPROTO_IP, libc::IP_PKTINFO, &v4 as *const _ as *const u8)
        };
        assert_eq!(got, Some("239.1.1.1".parse().unwrap()));

        let mut v6: libc::in6_pktinfo = unsafe { std::mem::zeroed() };
        v6.ipi6_addr.s6_addr = "ff03::1".parse::<Ipv6Addr>().unwrap().octets();
        let got = unsafe {
            destination_from_cmsg(libc::IPPROTO_IPV6, libc::IPV6_PKTINFO, &v6 as *const _ as *const u8)
        };
        assert_eq!(got, Some("ff03::1".parse().unwrap()));

        let got = unsafe {
            destination_from_cmsg(libc::SOL_SOCKET, libc::SO_TIMESTAMP, &v4 as *const _ as *const u8)
        };
        assert_eq!(got, None);
    }

    #[test]
    fn test_receives_destination_over_loopback() {
        use std::net::UdpSocket;
        use std::os::unix::io::AsRawFd;

        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let value: libc::c_int = 1;
        let rc = unsafe {
            libc::setsockopt(
                receiver.as_raw_fd(),
                libc::IPPROTO_IP,
                libc::IP_PKTINFO,
                &value as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        assert_eq!(rc, 0);

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"hello", receiver.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 64];
        let datagram = recv_with_destination(receiver.as_raw_fd(), &mut buf).unwrap();
        assert_eq!(datagram.len, 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(datagram.source, sender.local_addr().unwrap());
        assert_eq!(datagram.destination, Some("127.0.0.1".parse().unwrap()));
    }
}
