//! UDP transport layer

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{info, trace, warn};

use super::error::RelayError;

/// Largest datagram accepted from the socket
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Outbound half of the relay transport
///
/// Sends are fire-and-forget: implementations must not block the caller on
/// delivery, and a failed send only gets logged and counted.
pub trait DatagramSender: Send + Sync {
    fn send_to(&self, payload: Arc<[u8]>, dest: SocketAddr);

    /// Number of sends that have failed so far
    fn send_failures(&self) -> u64 {
        0
    }
}

/// UDP transport for relaying raw datagrams
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    send_failures: Arc<AtomicU64>,
}

impl UdpTransport {
    /// Bind to a local address with SO_REUSEADDR enabled
    pub async fn bind(addr: &str) -> Result<Self, RelayError> {
        let parsed_addr: SocketAddr = addr.parse()?;

        let domain = if parsed_addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        // Allow a quick rebind after restart
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&parsed_addr.into())?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;

        info!("UDP transport bound to {} (SO_REUSEADDR enabled)", local_addr);

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            send_failures: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Get the local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive one raw datagram (returns bytes and sender address)
    pub async fn recv_raw(&self) -> Result<(Vec<u8>, SocketAddr), RelayError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, addr) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        trace!("Received {} raw bytes from {}", len, addr);
        Ok((buf, addr))
    }
}

impl DatagramSender for UdpTransport {
    fn send_to(&self, payload: Arc<[u8]>, dest: SocketAddr) {
        let socket = self.socket.clone();
        let failures = self.send_failures.clone();

        // Completion never touches relay state, it only logs and counts
        tokio::spawn(async move {
            match socket.send_to(&payload, dest).await {
                Ok(_) => trace!("Relayed {} bytes to {}", payload.len(), dest),
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Failed to relay to {}: {}", dest, e);
                }
            }
        });
    }

    fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }
}

/// In-process transport that records every send
///
/// Destinations listed with [`MemoryTransport::fail_for`] are treated as
/// unreachable: their sends are counted as failures and not recorded.
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<(SocketAddr, Arc<[u8]>)>>,
    unreachable: Mutex<Vec<SocketAddr>>,
    send_failures: AtomicU64,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later send to `dest` fail
    pub fn fail_for(&self, dest: SocketAddr) {
        self.unreachable.lock().push(dest);
    }

    /// Take all recorded sends
    pub fn drain(&self) -> Vec<(SocketAddr, Arc<[u8]>)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Recorded sends to one destination
    pub fn sent_to(&self, dest: SocketAddr) -> Vec<Arc<[u8]>> {
        self.sent
            .lock()
            .iter()
            .filter(|(addr, _)| *addr == dest)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl DatagramSender for MemoryTransport {
    fn send_to(&self, payload: Arc<[u8]>, dest: SocketAddr) {
        if self.unreachable.lock().contains(&dest) {
            self.send_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to relay to {}: unreachable", dest);
            return;
        }
        self.sent.lock().push((dest, payload));
    }

    fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }
}

impl<T: DatagramSender + ?Sized> DatagramSender for Arc<T> {
    fn send_to(&self, payload: Arc<[u8]>, dest: SocketAddr) {
        (**self).send_to(payload, dest)
    }

    fn send_failures(&self) -> u64 {
        (**self).send_failures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_transport_bind() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        assert!(transport.local_addr().port() > 0);
    }

    #[tokio::test]
    async fn test_fire_and_forget_send() {
        let relay = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let peer = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        relay.send_to(Arc::from(&[1u8, 2, 3][..]), peer.local_addr());

        let (data, from) = tokio::time::timeout(Duration::from_secs(2), peer.recv_raw())
            .await
            .expect("timed out waiting for relayed datagram")
            .unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        assert_eq!(from, relay.local_addr());
        assert_eq!(relay.send_failures(), 0);
    }

    /// Test SO_REUSEADDR allows rebinding to same port after drop
    #[tokio::test]
    async fn test_transport_port_reuse() {
        let transport1 = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let port = transport1.local_addr().port();
        let addr = format!("127.0.0.1:{}", port);
        drop(transport1);

        let transport2 = UdpTransport::bind(&addr).await;
        assert!(
            transport2.is_ok(),
            "Should be able to rebind to same port with SO_REUSEADDR"
        );
    }

    #[test]
    fn test_invalid_bind_address() {
        let result = tokio_test::block_on(UdpTransport::bind("not-an-address"));
        assert!(matches!(result, Err(RelayError::AddrParse(_))));
    }

    #[test]
    fn test_memory_transport_failures() {
        let transport = MemoryTransport::new();
        let ok: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let down: SocketAddr = "127.0.0.1:2".parse().unwrap();
        transport.fail_for(down);

        transport.send_to(Arc::from(&b"a"[..]), ok);
        transport.send_to(Arc::from(&b"b"[..]), down);

        assert_eq!(transport.sent_count(), 1);
        assert_eq!(transport.send_failures(), 1);
        assert_eq!(transport.sent_to(ok).len(), 1);
        assert_eq!(transport.drain().len(), 1);
        assert_eq!(transport.sent_count(), 0);
    }
}
