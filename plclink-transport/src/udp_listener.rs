//! UDP channel listener
//!
//! One socket serves every peer. Datagrams are demultiplexed by source
//! address into per-peer logical channels; replies on a logical channel go
//! back to that peer only.

use crate::channel::{ByteChannel, MAX_UDP_PAYLOAD_SIZE};
use crate::error::PlcResult;
use crate::listener::{ChannelCreatedHandler, ChannelListener, ListenerCore, ListenerSettings};
use async_trait::async_trait;
use bytes::Bytes;
use plclink_core::logging::{default_logger, CommLogger};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use std::time::Duration;
use tokio::sync::mpsc;

const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Listens for UDP datagrams, one channel per remote endpoint
pub struct UdpChannelListener {
    settings: ListenerSettings,
    core: Arc<ListenerCore>,
}

impl UdpChannelListener {
    pub fn new(settings: ListenerSettings) -> Self {
        Self::with_logger(settings, default_logger())
    }

    pub fn with_logger(settings: ListenerSettings, logger: Arc<dyn CommLogger>) -> Self {
        let core = Arc::new(ListenerCore::new(settings.primary_policy, logger));
        Self { settings, core }
    }

    pub fn settings(&self) -> &ListenerSettings {
        &self.settings
    }
}

/// Receiving half of the shared socket
#[async_trait]
trait DatagramSource: Send + Sync {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl DatagramSource for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }
}

/// Next datagram, pausing after each receive error
async fn next_datagram<S: DatagramSource + ?Sized>(
    source: &S,
    buf: &mut [u8],
) -> (usize, SocketAddr) {
    loop {
        match source.recv_from(buf).await {
            Ok(received) => return received,
            Err(e) => {
                // ICMP port-unreachable surfaces here on some platforms.
                log::warn!("UDP receive failed: {}", e);
                tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
            }
        }
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, core: Arc<ListenerCore>) {
    let mut routes: HashMap<SocketAddr, mpsc::UnboundedSender<Bytes>> = HashMap::new();
    let mut buf = vec![0u8; MAX_UDP_PAYLOAD_SIZE];

    loop {
        let (n, peer) = next_datagram(socket.as_ref(), &mut buf).await;
        let datagram = Bytes::copy_from_slice(&buf[..n]);

        // A send fails once the peer's channel was closed; the next datagram
        // from that peer starts a fresh channel.
        let datagram = match routes.get(&peer) {
            Some(route) => match route.send(datagram) {
                Ok(()) => continue,
                Err(mpsc::error::SendError(datagram)) => datagram,
            },
            None => datagram,
        };

        log::info!("New UDP peer {}", peer);
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(datagram);
        routes.retain(|_, route| !route.is_closed());
        routes.insert(peer, tx);

        let channel = Arc::new(ByteChannel::from_datagrams(
            socket.clone(),
            peer,
            rx,
            core.logger.clone(),
        ));
        core.register(peer, channel);
    }
}

#[async_trait]
impl ChannelListener for UdpChannelListener {
    async fn start(&self) -> PlcResult<()> {
        self.core.check_startable()?;
        let socket = UdpSocket::bind(&self.settings.bind_address).await?;
        let local_addr = socket.local_addr()?;
        log::info!("UDP listener bound to {}", local_addr);

        let task = tokio::spawn(receive_loop(Arc::new(socket), self.core.clone()));
        self.core.set_running(local_addr, task);
        Ok(())
    }

    async fn stop(&self) {
        self.core.stop().await;
    }

    async fn dispose(&self) {
        self.core.dispose().await;
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.core.local_addr()
    }

    fn on_channel_created(&self, handler: ChannelCreatedHandler) {
        self.core.add_handler(handler);
    }

    fn channels(&self) -> Vec<Arc<ByteChannel>> {
        self.core.channels()
    }

    fn primary_channel(&self) -> Option<Arc<ByteChannel>> {
        self.core.primary_channel()
    }

    fn remove(&self, peer: &SocketAddr) -> Option<Arc<ByteChannel>> {
        self.core.remove(peer)
    }

    fn remove_channel(&self, channel: &ByteChannel) -> Option<Arc<ByteChannel>> {
        self.core.remove_channel(channel)
    }
}

impl Drop for UdpChannelListener {
    fn drop(&mut self) {
        self.core.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Fails `failures` times, then yields one datagram
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DatagramSource for Flaky {
        async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
            }
            buf[0] = 0x42;
            Ok((1, SocketAddr::from(([127, 0, 0, 1], 5000))))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_errors_back_off() {
        let source = Flaky {
            failures: 3,
            calls: AtomicUsize::new(0),
        };
        let mut buf = [0u8; 4];
        let started = Instant::now();
        let (n, peer) = next_datagram(&source, &mut buf).await;

        assert_eq!((n, buf[0]), (1, 0x42));
        assert_eq!(peer.port(), 5000);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= RECEIVE_RETRY_DELAY * 3);
    }

    #[tokio::test]
    async fn test_demultiplexes_peers() {
        let listener = UdpChannelListener::new(ListenerSettings::new("127.0.0.1:0"));
        listener.start().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        a.send_to(b"from-a", addr).await.unwrap();
        b.send_to(b"from-b", addr).await.unwrap();
        a.send_to(b"!", addr).await.unwrap();

        for _ in 0..200 {
            if listener.channels().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let channels = listener.channels();
        assert_eq!(channels.len(), 2);
        assert!(channels.iter().all(|c| c.kind() == ChannelKind::UdpPeer));

        let a_addr = a.local_addr().unwrap();
        let channel_a = channels
            .iter()
            .find(|c| c.peer_addr() == Some(a_addr))
            .unwrap()
            .clone();
        assert_eq!(channel_a.read_bytes(7, 1000).await.unwrap(), b"from-a!".to_vec());

        channel_a.write(b"reply").await.unwrap();
        let mut buf = [0u8; 16];
        let (n, from) = a.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"reply");
        assert_eq!(from, addr);

        drop(channel_a);
        drop(channels);
        listener.dispose().await;
    }

    async fn wait_for_channel(
        listener: &UdpChannelListener,
        peer: SocketAddr,
        stale_id: Option<u64>,
    ) -> Arc<ByteChannel> {
        for _ in 0..200 {
            let found = listener
                .channels()
                .into_iter()
                .find(|c| c.peer_addr() == Some(peer) && Some(c.id()) != stale_id);
            if let Some(channel) = found {
                return channel;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no channel for {}", peer);
    }

    #[tokio::test]
    async fn test_remove_stale_channel_keeps_newer_peer_channel() {
        let listener = UdpChannelListener::new(ListenerSettings::new("127.0.0.1:0"));
        listener.start().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();
        peer.send_to(b"one", addr).await.unwrap();
        let old = wait_for_channel(&listener, peer_addr, None).await;
        old.close().await;

        // The closed channel no longer accepts datagrams, so this one opens a
        // fresh channel under the same peer address.
        peer.send_to(b"two", addr).await.unwrap();
        let new = wait_for_channel(&listener, peer_addr, Some(old.id())).await;
        assert_ne!(new.id(), old.id());

        assert!(listener.remove_channel(&old).is_none());
        assert_eq!(listener.primary_channel().map(|c| c.id()), Some(new.id()));
        assert_eq!(listener.remove_channel(&new).map(|c| c.id()), Some(new.id()));
        assert!(listener.channels().is_empty());

        drop(new);
        listener.dispose().await;
    }
}
