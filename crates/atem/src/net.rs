//! The single bound UDP endpoint a client talks through.

use log::{debug, warn};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;

/// Burst sizing for the receive path; initial state dumps arrive as a
/// flood of back-to-back datagrams.
pub(crate) const RECV_BUFFER_SIZE: usize = 75 * 1024;

/// UDP socket bound to an ephemeral local port and connected to the peer.
pub(crate) struct Socket {
    inner: UdpSocket,
}

impl Socket {
    pub async fn bind(peer: SocketAddr) -> io::Result<Socket> {
        let local = match peer {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let inner = UdpSocket::bind(local).await?;
        inner.connect(peer).await?;
        debug!(
            "socket bound to {} for peer {}",
            inner.local_addr()?,
            peer
        );
        Ok(Socket { inner })
    }

    /// Best-effort send. Transmission reliability is the retransmit table's
    /// job, so failures are logged and swallowed here.
    pub async fn send(&self, datagram: &[u8]) {
        if let Err(e) = self.inner.send(datagram).await {
            warn!("failed to send {} byte datagram: {}", datagram.len(), e);
        }
    }

    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.recv(buf).await
    }
}
