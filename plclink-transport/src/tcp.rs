//! TCP client transport

use crate::channel::{ByteChannel, ChannelKind};
use crate::error::{PlcError, PlcResult};
use crate::stream::TransportLayer;
use async_trait::async_trait;
use plclink_core::logging::{default_logger, CommLogger};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// TCP transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
    /// Connect timeout in milliseconds, 0 waits indefinitely
    pub connect_timeout_ms: u64,
}

impl TcpSettings {
    /// Create new TCP settings with a 5 second connect timeout
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout_ms: 5000,
        }
    }

    /// Create TCP settings with connect timeout
    pub fn with_timeout(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            connect_timeout_ms: timeout.as_millis() as u64,
            ..Self::new(host, port)
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self::new("127.0.0.1", 502)
    }
}

/// TCP client transport
pub struct TcpTransport {
    settings: TcpSettings,
    logger: Arc<dyn CommLogger>,
}

impl TcpTransport {
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            settings,
            logger: default_logger(),
        }
    }

    /// Create TCP transport from a `host:port` string
    pub fn from_address(address: &str) -> PlcResult<Self> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| PlcError::InvalidData(format!("Invalid TCP address: {}", address)))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| PlcError::InvalidData(format!("Invalid TCP port: {}", e)))?;
        Ok(Self::new(TcpSettings::new(host, port)))
    }

    pub fn with_logger(mut self, logger: Arc<dyn CommLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }
}

#[async_trait]
impl TransportLayer for TcpTransport {
    async fn open(&self) -> PlcResult<ByteChannel> {
        let address = self.settings.address();
        let stream = if self.settings.connect_timeout_ms > 0 {
            tokio::time::timeout(
                Duration::from_millis(self.settings.connect_timeout_ms),
                TcpStream::connect(&address),
            )
            .await
            .map_err(|_| PlcError::Timeout)??
        } else {
            TcpStream::connect(&address).await?
        };
        stream.set_nodelay(true)?;

        Ok(ByteChannel::from_tcp(
            stream,
            ChannelKind::TcpClient,
            self.logger.clone(),
        ))
    }

    fn description(&self) -> String {
        format!("tcp {}", self.settings.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_from_address() {
        let transport = TcpTransport::from_address("10.0.0.5:2004").unwrap();
        assert_eq!(transport.settings().host, "10.0.0.5");
        assert_eq!(transport.settings().port, 2004);
        assert!(TcpTransport::from_address("nohost").is_err());
        assert!(TcpTransport::from_address("host:notaport").is_err());
    }

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let channel = TcpTransport::new(TcpSettings::new("127.0.0.1", port))
            .open()
            .await
            .unwrap();
        assert_eq!(channel.kind(), ChannelKind::TcpClient);
        channel.write(&[1, 2, 3, 4]).await.unwrap();
        assert_eq!(channel.read_bytes(4, 1000).await.unwrap(), vec![1, 2, 3, 4]);

        server.await.unwrap();
        channel.close().await;
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpTransport::new(TcpSettings::new("127.0.0.1", port)).open().await;
        assert!(matches!(result, Err(PlcError::Connection(_))));
    }
}
