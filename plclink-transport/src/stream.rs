//! Transport layer trait and generic stream transport

use crate::channel::{ByteChannel, ChannelKind};
use crate::error::PlcResult;
use async_trait::async_trait;
use plclink_core::logging::{default_logger, CommLogger};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// A transport that can be opened into a [`ByteChannel`]
#[async_trait]
pub trait TransportLayer: Send + Sync {
    /// Connect (or open the device) and start receiving
    ///
    /// # Returns
    ///
    /// A live channel; the receive worker is already running.
    async fn open(&self) -> PlcResult<ByteChannel>;

    /// Human-readable endpoint description
    fn description(&self) -> String;
}

/// Wraps an arbitrary duplex stream (pipes, in-memory streams, TLS streams)
pub struct StreamTransport<S> {
    stream: S,
    description: String,
    logger: Arc<dyn CommLogger>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, description: impl Into<String>) -> Self {
        Self {
            stream,
            description: description.into(),
            logger: default_logger(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn CommLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Consume the stream into a channel
    pub fn open(self) -> ByteChannel {
        ByteChannel::from_stream(self.stream, ChannelKind::Stream, self.description, self.logger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_stream_transport_open() {
        let (local, mut remote) = tokio::io::duplex(256);
        let channel = StreamTransport::new(local, "pipe").open();
        assert_eq!(channel.description(), "pipe");
        assert_eq!(channel.kind(), ChannelKind::Stream);

        remote.write_all(b"ok").await.unwrap();
        assert_eq!(channel.read_bytes(2, 500).await.unwrap(), b"ok".to_vec());
    }
}
