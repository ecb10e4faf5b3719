use crate::error::SetupError;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use tokio::io::unix::AsyncFd;

/// Datagram endpoint the probe loop sends requests on and reads replies from.
#[allow(async_fn_in_trait)]
pub trait RawEndpoint {
    /// Non-blocking send of a whole ICMP message.
    fn send_to(&self, packet: &[u8], destination: Ipv4Addr) -> io::Result<usize>;

    /// Waits until the endpoint is readable, then makes exactly one non-blocking receive.
    ///
    /// Returns `WouldBlock` when the wake-up turned out to be spurious.
    async fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, Ipv4Addr)>;
}

/// `SOCK_RAW` / `IPPROTO_ICMP` socket registered with the tokio reactor.
///
/// Opening it requires root or `CAP_NET_RAW` on Linux. Reads return whole IPv4
/// datagrams, IP header included. Once configured through socket2 the descriptor
/// is driven as a std datagram socket, which owns the safe `recv_from`.
pub struct RawSocket {
    inner: AsyncFd<UdpSocket>,
}

impl RawSocket {
    /// Must be called from within a tokio runtime.
    pub fn open(source: Option<Ipv4Addr>) -> Result<Self, SetupError> {
        let socket =
            Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(|error| {
                match error.raw_os_error() {
                    Some(libc::EPROTONOSUPPORT) | Some(libc::EAFNOSUPPORT) => {
                        SetupError::UnsupportedProtocol(error)
                    }
                    _ => SetupError::RawSocket(error),
                }
            })?;
        socket.set_nonblocking(true).map_err(SetupError::RawSocket)?;
        if let Some(addr) = source {
            socket
                .bind(&SockAddr::from(SocketAddrV4::new(addr, 0)))
                .map_err(|source| SetupError::Bind { addr, source })?;
        }
        let inner = AsyncFd::new(UdpSocket::from(socket)).map_err(SetupError::Runtime)?;
        Ok(Self { inner })
    }
}

impl RawEndpoint for RawSocket {
    fn send_to(&self, packet: &[u8], destination: Ipv4Addr) -> io::Result<usize> {
        self.inner
            .get_ref()
            .send_to(packet, SocketAddrV4::new(destination, 0))
    }

    async fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, Ipv4Addr)> {
        let mut guard = self.inner.readable().await?;
        match guard.try_io(|inner| recv_ipv4(inner.get_ref(), buffer)) {
            Ok(received) => received,
            Err(_would_block) => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

fn recv_ipv4(socket: &UdpSocket, buffer: &mut [u8]) -> io::Result<(usize, Ipv4Addr)> {
    let (length, from) = socket.recv_from(buffer)?;
    Ok((length, ipv4_source(from)?))
}

fn ipv4_source(from: SocketAddr) -> io::Result<Ipv4Addr> {
    match from {
        SocketAddr::V4(addr) => Ok(*addr.ip()),
        SocketAddr::V6(addr) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("datagram from a non IPv4 address {}", addr.ip()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv6Addr, SocketAddrV6};

    #[test]
    fn replies_come_from_ipv4_sources() {
        let from = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 7), 0));
        assert_eq!(ipv4_source(from).unwrap(), Ipv4Addr::new(192, 0, 2, 7));

        let from = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 0, 0, 0));
        let error = ipv4_source(from).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }
}
