//! Slave-side stream dispatcher
//!
//! One dispatcher drives one [`ByteChannel`]: it assembles request frames
//! with the protocol's framing check, resynchronises byte by byte after
//! garbage, and writes back whatever the [`SlaveProtocol`] answers.

use crate::slave::{FrameOutcome, SlaveProtocol};
use plclink_codec::framing::FrameCheck;
use plclink_core::error::{PlcError, PlcResult};
use plclink_core::logging::CommEventKind;
use plclink_transport::ByteChannel;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Dispatcher tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Close a listener-produced channel after this long without a parsed
    /// frame; 0 waits forever
    pub idle_timeout_ms: u64,
    /// Unrecognized bytes held before they are logged as one event
    pub max_error_accumulator: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 10_000,
            max_error_accumulator: 256,
        }
    }
}

/// Serves requests arriving on one channel
pub struct StreamDispatcher {
    channel: Arc<ByteChannel>,
    protocol: Arc<dyn SlaveProtocol>,
    config: DispatcherConfig,
}

/// Progress made by one pass through the framing loop
enum Step {
    /// A complete frame was parsed and dispatched
    Parsed,
    /// The framing check failed; the frame was dropped
    Rejected,
}

impl StreamDispatcher {
    pub fn new(channel: Arc<ByteChannel>, protocol: Arc<dyn SlaveProtocol>) -> Self {
        Self::with_config(channel, protocol, DispatcherConfig::default())
    }

    pub fn with_config(
        channel: Arc<ByteChannel>,
        protocol: Arc<dyn SlaveProtocol>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            channel,
            protocol,
            config,
        }
    }

    pub fn channel(&self) -> &Arc<ByteChannel> {
        &self.channel
    }

    /// Run on a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Serve until the channel closes
    ///
    /// Listener-produced channels are closed on idle timeout or on any
    /// failure; channels the caller owns are only ever closed by the caller.
    pub async fn run(&self) {
        let listener_produced = self.channel.kind().is_listener_produced();
        let mut pending = Vec::new();
        let mut errors = Vec::new();
        let mut deadline = self.next_deadline();

        log::debug!(
            "[{}] {} dispatcher started",
            self.channel.description(),
            self.protocol.name()
        );

        loop {
            if self.channel.is_closed() {
                break;
            }

            match self.next_step(&mut pending, &mut errors, deadline).await {
                Ok(Step::Parsed) => deadline = self.next_deadline(),
                Ok(Step::Rejected) => {}
                Err(_) if self.channel.is_closed() => break,
                Err(PlcError::Timeout) => {
                    if listener_produced {
                        log::info!(
                            "[{}] idle for {} ms, closing",
                            self.channel.description(),
                            self.config.idle_timeout_ms
                        );
                        self.channel.close().await;
                        break;
                    }
                    deadline = self.next_deadline();
                }
                Err(e) => {
                    log::warn!("[{}] dispatch failed: {}", self.channel.description(), e);
                    if listener_produced {
                        self.channel.close().await;
                        break;
                    }
                }
            }
        }

        self.flush_errors(&mut errors);
        log::debug!("[{}] dispatcher stopped", self.channel.description());
    }

    fn next_deadline(&self) -> Option<Instant> {
        match self.config.idle_timeout_ms {
            0 => None,
            ms => Some(Instant::now() + Duration::from_millis(ms)),
        }
    }

    /// Grow `pending` to `len` bytes, failing with [`PlcError::Timeout`] at
    /// `deadline`
    ///
    /// Bytes are moved one at a time so nothing read is lost when the
    /// deadline cuts a frame in half; the partial frame stays in `pending`.
    async fn fill(
        &self,
        pending: &mut Vec<u8>,
        len: usize,
        deadline: Option<Instant>,
    ) -> PlcResult<()> {
        while pending.len() < len {
            let byte = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, self.channel.read_byte(0))
                    .await
                    .map_err(|_| PlcError::Timeout)??,
                None => self.channel.read_byte(0).await?,
            };
            pending.push(byte);
        }
        Ok(())
    }

    /// Read until one frame is parsed or rejected
    ///
    /// `pending` carries bytes read past a frame, or a frame cut short by the
    /// idle deadline, into the next call.
    async fn next_step(
        &self,
        pending: &mut Vec<u8>,
        errors: &mut Vec<u8>,
        deadline: Option<Instant>,
    ) -> PlcResult<Step> {
        self.fill(pending, self.protocol.header_len(), deadline).await?;

        loop {
            match self.protocol.check_request(pending) {
                Ok(FrameCheck::BadHeader) => {
                    errors.push(pending.remove(0));
                    if errors.len() >= self.config.max_error_accumulator {
                        self.flush_errors(errors);
                    }
                    if pending.is_empty() {
                        self.fill(pending, 1, deadline).await?;
                    }
                }
                Ok(FrameCheck::NeedMore(n)) => {
                    self.fill(pending, pending.len() + n.max(1), deadline).await?;
                }
                Ok(FrameCheck::Complete(len)) => {
                    self.flush_errors(errors);
                    let rest = pending.split_off(len.min(pending.len()));
                    let frame = std::mem::replace(pending, rest);
                    self.dispatch(&frame).await?;
                    return Ok(Step::Parsed);
                }
                Err(code) => {
                    self.flush_errors(errors);
                    let mut frame = std::mem::take(pending);
                    frame.extend(self.channel.read_all_buffered().await);
                    self.channel.log_code(CommEventKind::FrameRejected, &frame, code);
                    if let Some(nak) = self.protocol.reject(&frame, code) {
                        self.respond(&nak).await?;
                    }
                    return Ok(Step::Rejected);
                }
            }
        }
    }

    async fn dispatch(&self, frame: &[u8]) -> PlcResult<()> {
        self.channel.log(CommEventKind::FrameReceived, frame);

        let protocol = &self.protocol;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| protocol.handle_frame(frame)))
            .map_err(|_| PlcError::InvalidState(format!("{} handler panicked", protocol.name())))?;

        match outcome {
            FrameOutcome::Handled(Some(response)) => self.respond(&response).await,
            FrameOutcome::Handled(None) | FrameOutcome::Ignored => Ok(()),
            FrameOutcome::Rejected { code, response } => {
                self.channel.log_code(CommEventKind::FrameRejected, frame, code);
                match response {
                    Some(response) => self.respond(&response).await,
                    None => Ok(()),
                }
            }
        }
    }

    async fn respond(&self, response: &[u8]) -> PlcResult<()> {
        self.channel.log(CommEventKind::FrameSent, response);
        self.channel.write(response).await
    }

    fn flush_errors(&self, errors: &mut Vec<u8>) {
        if !errors.is_empty() {
            self.channel.log(CommEventKind::UnrecognizedData, errors);
            errors.clear();
        }
    }
}
