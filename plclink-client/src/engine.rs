//! Master-side request/response engine
//!
//! [`RequestEngine`] runs one transaction at a time on a [`ByteChannel`]:
//! encode, write, assemble the response frame following the protocol's
//! framing rules, decode, and turn NAK responses into
//! [`PlcError::Nak`]. Nothing is retried; retry policy belongs to the
//! caller.

use plclink_codec::framing::FrameCheck;
use plclink_core::error::{PlcError, PlcResult};
use plclink_core::logging::CommEventKind;
use plclink_core::nak::NakCode;
use plclink_transport::ByteChannel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bound on each wait for response bytes and on the whole response;
    /// 0 waits indefinitely
    pub response_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 3000,
        }
    }
}

impl EngineConfig {
    pub fn new(response_timeout_ms: u64) -> Self {
        Self { response_timeout_ms }
    }
}

/// Protocol half of a master transaction
pub trait MasterProtocol: Send + Sync {
    type Request: Send + Sync;
    type Response: Send;

    /// Encode a request frame, rejecting requests the peer could not accept
    fn encode(&self, request: &Self::Request) -> PlcResult<Vec<u8>>;

    /// Bytes to collect before the first [`check_response`](Self::check_response)
    fn header_len(&self) -> usize;

    /// Frame boundary of the response collected so far
    fn check_response(&self, buf: &[u8]) -> Result<FrameCheck, NakCode>;

    fn decode(&self, frame: &[u8]) -> Result<Self::Response, NakCode>;

    /// NAK code reported by the peer, if the response is a NAK
    fn nak_code(&self, response: &Self::Response) -> Option<NakCode>;

    /// Verify the response answers `request`
    fn correlate(&self, request: &Self::Request, response: &Self::Response) -> PlcResult<()>;
}

/// Runs transactions of protocol `P` on one channel
pub struct RequestEngine<P: MasterProtocol> {
    channel: Arc<ByteChannel>,
    protocol: P,
    config: EngineConfig,
    /// One in-flight transaction per engine
    transaction: tokio::sync::Mutex<()>,
}

impl<P: MasterProtocol> RequestEngine<P> {
    pub fn new(channel: Arc<ByteChannel>, protocol: P) -> Self {
        Self::with_config(channel, protocol, EngineConfig::default())
    }

    pub fn with_config(channel: Arc<ByteChannel>, protocol: P, config: EngineConfig) -> Self {
        Self {
            channel,
            protocol,
            config,
            transaction: tokio::sync::Mutex::new(()),
        }
    }

    pub fn channel(&self) -> &Arc<ByteChannel> {
        &self.channel
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Send `request` and wait for its response
    ///
    /// Bytes left over from an earlier transaction are discarded before the
    /// request is written, and well-formed responses that answer another
    /// request are skipped until the response timeout.
    ///
    /// # Errors
    /// - [`PlcError::Timeout`] when no matching frame arrives in time or the
    ///   transport fails
    /// - [`PlcError::Decode`] when the response is malformed
    /// - [`PlcError::Nak`] when the peer rejected the request
    pub async fn request(&self, request: &P::Request) -> PlcResult<P::Response> {
        let _transaction = self.transaction.lock().await;

        let frame = self.protocol.encode(request)?;
        let stale = self.channel.read_all_buffered().await;
        if !stale.is_empty() {
            log::debug!(
                "[{}] discarding {} stale bytes",
                self.channel.description(),
                stale.len()
            );
            self.channel.log(CommEventKind::UnrecognizedData, &stale);
        }
        self.channel.write(&frame).await?;
        self.channel.log(CommEventKind::FrameSent, &frame);

        let (received, response) = match self.config.response_timeout_ms {
            0 => self.receive(request).await?,
            ms => tokio::time::timeout(Duration::from_millis(ms), self.receive(request))
                .await
                .map_err(|_| PlcError::Timeout)??,
        };

        if let Some(code) = self.protocol.nak_code(&response) {
            log::debug!("[{}] peer rejected request: {}", self.channel.description(), code);
            return Err(PlcError::Nak {
                code,
                response: received,
                request: frame,
            });
        }
        Ok(response)
    }

    /// Read frames until one answers `request`
    async fn receive(&self, request: &P::Request) -> PlcResult<(Vec<u8>, P::Response)> {
        loop {
            let received = self.read_frame().await?;
            self.channel.log(CommEventKind::FrameReceived, &received);

            let response = self
                .protocol
                .decode(&received)
                .map_err(|code| PlcError::decode(code, &received))?;
            match self.protocol.correlate(request, &response) {
                Ok(()) => return Ok((received, response)),
                Err(e) => log::debug!(
                    "[{}] skipping response: {}",
                    self.channel.description(),
                    e
                ),
            }
        }
    }

    /// Collect one response frame, skipping bytes that cannot start one
    async fn read_frame(&self) -> PlcResult<Vec<u8>> {
        let timeout = self.config.response_timeout_ms;
        let mut buf = self
            .channel
            .read_bytes(self.protocol.header_len().max(1), timeout)
            .await?;

        loop {
            match self.protocol.check_response(&buf) {
                Ok(FrameCheck::Complete(len)) => {
                    if len < buf.len() {
                        self.channel
                            .log(CommEventKind::UnrecognizedData, &buf[len..]);
                        buf.truncate(len);
                    }
                    return Ok(buf);
                }
                Ok(FrameCheck::NeedMore(more)) => {
                    let rest = self.channel.read_bytes(more, timeout).await?;
                    buf.extend_from_slice(&rest);
                }
                Ok(FrameCheck::BadHeader) => {
                    self.channel.log(CommEventKind::UnrecognizedData, &buf[..1]);
                    buf.remove(0);
                    if buf.is_empty() {
                        buf.push(self.channel.read_byte(timeout).await?);
                    }
                }
                Err(code) => {
                    buf.extend(self.channel.read_all_buffered().await);
                    self.channel.log_code(CommEventKind::FrameRejected, &buf, code);
                    return Err(PlcError::decode(code, &buf));
                }
            }
        }
    }
}
