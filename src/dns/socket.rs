//! Non-blocking datagram socket seam

use std::io;
use std::net::{SocketAddrV4, UdpSocket};

pub trait DatagramSocket {
    fn send_to(&mut self, datagram: &[u8], target: SocketAddrV4) -> io::Result<()>;

    /// Read one waiting datagram into `buf`; `Ok(None)` when nothing is queued.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

impl<T: DatagramSocket + ?Sized> DatagramSocket for Box<T> {
    fn send_to(&mut self, datagram: &[u8], target: SocketAddrV4) -> io::Result<()> {
        (**self).send_to(datagram, target)
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        (**self).try_recv(buf)
    }
}

/// Bind an ephemeral non-blocking UDP socket.
pub fn bind_nonblocking() -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

impl DatagramSocket for UdpSocket {
    fn send_to(&mut self, datagram: &[u8], target: SocketAddrV4) -> io::Result<()> {
        UdpSocket::send_to(self, datagram, target)?;
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.recv_from(buf) {
            Ok((len, _)) => Ok(Some(len)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_udp_loopback_roundtrip() {
        let mut receiver = bind_nonblocking().unwrap();
        let mut sender = bind_nonblocking().unwrap();
        let port = receiver.local_addr().unwrap().port();

        let mut buf = [0u8; 64];
        assert!(matches!(receiver.try_recv(&mut buf), Ok(None)));

        DatagramSocket::send_to(
            &mut sender,
            b"ping",
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, port),
        )
        .unwrap();

        let mut received = None;
        for _ in 0..100 {
            if let Some(len) = receiver.try_recv(&mut buf).unwrap() {
                received = Some(len);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(received, Some(4));
        assert_eq!(&buf[..4], b"ping");
    }
}
