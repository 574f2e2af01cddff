use socket2::{Domain, Protocol, Socket, Type};
use std::io::Result;
use std::net::{SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;

/// Creates a non-blocking IPv4 udp socket registered with the tokio reactor.
///
/// `reuse` sets SO_REUSEADDR, `ttl` sets the outgoing IP TTL before the
/// first packet leaves.
pub(crate) fn udp_socket(
    local_addr: SocketAddrV4,
    reuse: bool,
    ttl: Option<u32>,
) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    if reuse {
        socket.set_reuse_address(true)?;
    }
    if let Some(ttl) = ttl {
        socket.set_ttl(ttl)?;
    }
    socket.bind(&SocketAddr::V4(local_addr).into())?;
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_udp_socket_ttl() {
        let s = udp_socket(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), true, Some(7)).unwrap();
        assert_eq!(s.ttl().unwrap(), 7);
        assert_ne!(s.local_addr().unwrap().port(), 0);
    }
}
