//! TCP channel listener

use crate::channel::{ByteChannel, ChannelKind};
use crate::error::PlcResult;
use crate::listener::{ChannelCreatedHandler, ChannelListener, ListenerCore, ListenerSettings};
use async_trait::async_trait;
use plclink_core::logging::{default_logger, CommLogger};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Accepts TCP connections, one channel per connection
pub struct TcpChannelListener {
    settings: ListenerSettings,
    core: Arc<ListenerCore>,
}

impl TcpChannelListener {
    pub fn new(settings: ListenerSettings) -> Self {
        Self::with_logger(settings, default_logger())
    }

    /// Channels created by this listener log through `logger`
    pub fn with_logger(settings: ListenerSettings, logger: Arc<dyn CommLogger>) -> Self {
        let core = Arc::new(ListenerCore::new(settings.primary_policy, logger));
        Self { settings, core }
    }

    pub fn settings(&self) -> &ListenerSettings {
        &self.settings
    }
}

async fn accept_loop(listener: TcpListener, core: Arc<ListenerCore>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                log::info!("Accepted connection from {}", addr);
                if let Err(e) = stream.set_nodelay(true) {
                    log::debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                }
                let channel = Arc::new(ByteChannel::from_tcp(
                    stream,
                    ChannelKind::TcpAccepted,
                    core.logger.clone(),
                ));
                core.register(addr, channel);
            }
            Err(e) => {
                log::error!("Error accepting connection: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

#[async_trait]
impl ChannelListener for TcpChannelListener {
    async fn start(&self) -> PlcResult<()> {
        self.core.check_startable()?;
        let listener = TcpListener::bind(&self.settings.bind_address).await?;
        let local_addr = listener.local_addr()?;
        log::info!("TCP listener bound to {}", local_addr);

        let task = tokio::spawn(accept_loop(listener, self.core.clone()));
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

impl Drop for TcpChannelListener {
    fn drop(&mut self) {
        self.core.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlcError;
    use crate::listener::PrimaryChannelPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_accepts_and_tracks_channels() {
        let listener = TcpChannelListener::new(ListenerSettings::new("127.0.0.1:0"));
        let created = Arc::new(AtomicUsize::new(0));
        {
            let created = created.clone();
            listener.on_channel_created(Arc::new(move |_channel| {
                created.fetch_add(1, Ordering::SeqCst);
            }));
        }
        listener.start().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let first = TcpStream::connect(addr).await.unwrap();
        wait_for(|| created.load(Ordering::SeqCst) == 1).await;
        let second = TcpStream::connect(addr).await.unwrap();
        wait_for(|| created.load(Ordering::SeqCst) == 2).await;

        assert_eq!(listener.channels().len(), 2);
        let primary = listener.primary_channel().unwrap();
        assert_eq!(primary.peer_addr(), second.local_addr().ok());
        assert_eq!(primary.kind(), ChannelKind::TcpAccepted);
        drop(first);

        listener.dispose().await;
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn test_prunes_closed_channels_on_new_connection() {
        let listener = TcpChannelListener::new(ListenerSettings::new("127.0.0.1:0"));
        listener.start().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let first = TcpStream::connect(addr).await.unwrap();
        wait_for(|| listener.channels().len() == 1).await;
        let channel = listener.primary_channel().unwrap();
        drop(first);
        wait_for(|| channel.is_closed()).await;

        let _second = TcpStream::connect(addr).await.unwrap();
        wait_for(|| listener.channels().iter().any(|c| c.id() != channel.id())).await;
        assert_eq!(listener.channels().len(), 1);

        listener.dispose().await;
    }

    #[tokio::test]
    async fn test_oldest_policy_and_remove() {
        let settings = ListenerSettings::new("127.0.0.1:0")
            .with_primary_policy(PrimaryChannelPolicy::Oldest);
        let listener = TcpChannelListener::new(settings);
        listener.start().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let first = TcpStream::connect(addr).await.unwrap();
        wait_for(|| listener.channels().len() == 1).await;
        let _second = TcpStream::connect(addr).await.unwrap();
        wait_for(|| listener.channels().len() == 2).await;

        let primary = listener.primary_channel().unwrap();
        let first_addr = first.local_addr().unwrap();
        assert_eq!(primary.peer_addr(), Some(first_addr));

        assert!(listener.remove(&first_addr).is_some());
        assert_eq!(listener.channels().len(), 1);
        listener.dispose().await;
    }

    #[tokio::test]
    async fn test_channel_echo() {
        let listener = TcpChannelListener::new(ListenerSettings::new("127.0.0.1:0"));
        listener.start().await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        wait_for(|| listener.primary_channel().is_some()).await;
        let channel = listener.primary_channel().unwrap();

        client.write_all(&[9, 8, 7]).await.unwrap();
        let data = channel.read_bytes(3, 1000).await.unwrap();
        channel.write(&data).await.unwrap();
        let mut echoed = [0u8; 3];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(echoed, [9, 8, 7]);

        drop(channel);
        listener.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_unretained_channels_only() {
        let listener = TcpChannelListener::new(ListenerSettings::new("127.0.0.1:0"));
        listener.start().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _a = TcpStream::connect(addr).await.unwrap();
        wait_for(|| listener.channels().len() == 1).await;
        let retained = listener.primary_channel().unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();
        wait_for(|| listener.channels().len() == 2).await;

        listener.stop().await;
        assert!(!retained.is_closed());
        assert!(listener.channels().is_empty());
        retained.close().await;
    }

    #[tokio::test]
    async fn test_start_after_dispose_fails() {
        let listener = TcpChannelListener::new(ListenerSettings::new("127.0.0.1:0"));
        listener.start().await.unwrap();
        assert!(matches!(
            listener.start().await,
            Err(PlcError::InvalidState(_))
        ));
        listener.dispose().await;
        assert!(matches!(
            listener.start().await,
            Err(PlcError::AlreadyDisposed)
        ));
    }
}
