//! Datagram delivery over UDP.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
};

use tracing::trace;

use super::{Transport, TransportError};
use crate::metric::Metric;

/// Sends each metric as its own JSON datagram.
///
/// The socket is unconnected and only ever written to. Datagrams that are lost in flight are not detected.
#[derive(Debug)]
pub struct UdpSender {
    socket: UdpSocket,
    remote_addr: SocketAddr,
}

impl UdpSender {
    /// Creates a new `UdpSender` targeting `remote_addr`.
    ///
    /// # Errors
    ///
    /// If a local socket cannot be bound, an error is returned.
    pub fn new(remote_addr: SocketAddr) -> io::Result<Self> {
        let local_addr = match remote_addr {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local_addr)?;

        Ok(UdpSender { socket, remote_addr })
    }

    /// Returns the address datagrams are sent to.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl Transport for UdpSender {
    fn send(&self, metrics: &[&Metric]) -> Result<(), TransportError> {
        for metric in metrics {
            let datagram = serde_json::to_vec(&metric.to_payload())?;
            let sent = self.socket.send_to(&datagram, self.remote_addr)?;
            trace!(what = metric.what(), bytes = sent, remote_addr = %self.remote_addr, "Sent datagram.");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{SocketAddr, UdpSocket},
        time::Duration,
    };

    use super::UdpSender;
    use crate::{
        metric::{Metric, Payload},
        transport::Transport,
    };

    fn receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn recv_payload(socket: &UdpSocket) -> Payload {
        let mut buf = [0u8; 65536];
        let len = socket.recv(&mut buf).unwrap();
        serde_json::from_slice(&buf[..len]).unwrap()
    }

    #[test]
    fn one_datagram_per_metric() {
        let (socket, addr) = receiver();
        let sender = UdpSender::new(addr).unwrap();

        let first = Metric::new("first", "key").with_value(1);
        let second = Metric::new("second", "key").with_value(2.5);
        sender.send(&[&first, &second]).unwrap();

        assert_eq!(recv_payload(&socket), first.to_payload());
        assert_eq!(recv_payload(&socket), second.to_payload());
    }

    #[test]
    fn send_single() {
        let (socket, addr) = receiver();
        let sender = UdpSender::new(addr).unwrap();

        let metric = Metric::new("single", "key").with_tags(["a"]);
        sender.send_single(&metric).unwrap();

        assert_eq!(recv_payload(&socket), metric.to_payload());
    }

    #[test]
    fn datagram_is_plain_json() {
        let (socket, addr) = receiver();
        let sender = UdpSender::new(addr).unwrap();

        sender.send_single(&Metric::new("test", "key")).unwrap();

        let mut buf = [0u8; 65536];
        let len = socket.recv(&mut buf).unwrap();
        let datagram = std::str::from_utf8(&buf[..len]).unwrap();
        assert!(datagram.starts_with('{'));
        assert!(datagram.ends_with('}'));
    }

    #[test]
    fn empty_batch_sends_nothing() {
        let (_socket, addr) = receiver();
        let sender = UdpSender::new(addr).unwrap();
        sender.send(&[]).unwrap();
    }
}
