//! UDP client transport

use crate::channel::ByteChannel;
use crate::error::{PlcError, PlcResult};
use crate::stream::TransportLayer;
use async_trait::async_trait;
use plclink_core::logging::{default_logger, CommLogger};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::UdpSocket;

pub use crate::channel::MAX_UDP_PAYLOAD_SIZE;

/// UDP transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpSettings {
    pub remote_host: String,
    pub remote_port: u16,
    /// Local port to bind, 0 picks an ephemeral port
    pub local_port: u16,
}

impl UdpSettings {
    pub fn new(remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_port,
            local_port: 0,
        }
    }

    /// Create UDP settings with a fixed local port
    pub fn with_local_port(remote_host: impl Into<String>, remote_port: u16, local_port: u16) -> Self {
        Self {
            local_port,
            ..Self::new(remote_host, remote_port)
        }
    }

    pub fn remote_address(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

/// UDP client transport
///
/// The socket is connected to the remote endpoint, so datagrams from any
/// other source are dropped by the OS.
pub struct UdpTransport {
    settings: UdpSettings,
    logger: Arc<dyn CommLogger>,
}

impl UdpTransport {
    pub fn new(settings: UdpSettings) -> Self {
        Self {
            settings,
            logger: default_logger(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn CommLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn settings(&self) -> &UdpSettings {
        &self.settings
    }
}

#[async_trait]
impl TransportLayer for UdpTransport {
    async fn open(&self) -> PlcResult<ByteChannel> {
        let remote = tokio::net::lookup_host(self.settings.remote_address())
            .await?
            .next()
            .ok_or_else(|| {
                PlcError::InvalidData(format!(
                    "Cannot resolve UDP address: {}",
                    self.settings.remote_address()
                ))
            })?;
        let local = if remote.is_ipv4() {
            format!("0.0.0.0:{}", self.settings.local_port)
        } else {
            format!("[::]:{}", self.settings.local_port)
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        Ok(ByteChannel::from_udp_socket(socket, self.logger.clone()))
    }

    fn description(&self) -> String {
        format!("udp {}", self.settings.remote_address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;

    #[tokio::test]
    async fn test_datagram_exchange() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();

        let channel = UdpTransport::new(UdpSettings::new("127.0.0.1", port))
            .open()
            .await
            .unwrap();
        assert_eq!(channel.kind(), ChannelKind::UdpClient);
        channel.write(b"ping").await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        peer.send_to(b"pong", from).await.unwrap();

        assert_eq!(channel.read_bytes(4, 1000).await.unwrap(), b"pong".to_vec());
        channel.close().await;
    }
}
