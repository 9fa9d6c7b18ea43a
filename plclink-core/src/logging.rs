//! Communication logging boundary
//!
//! The transport and protocol layers never format frames for display. They
//! hand raw bytes and fields to an injected [`CommLogger`]; presentation is
//! up to the implementation.

use crate::nak::NakCode;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

/// Kind of communication event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommEventKind {
    ChannelOpened,
    ChannelClosed,
    FrameSent,
    FrameReceived,
    /// Bytes discarded while resynchronizing on a stream
    UnrecognizedData,
    /// A malformed frame that was answered (or dropped) with a NAK code
    FrameRejected,
}

/// One structured log entry
#[derive(Debug, Clone, Copy)]
pub struct CommEvent<'a> {
    pub kind: CommEventKind,
    /// Channel description (e.g. `tcp 127.0.0.1:502`)
    pub channel: &'a str,
    pub bytes: &'a [u8],
    pub code: Option<NakCode>,
}

impl<'a> CommEvent<'a> {
    pub fn new(kind: CommEventKind, channel: &'a str, bytes: &'a [u8]) -> Self {
        Self {
            kind,
            channel,
            bytes,
            code: None,
        }
    }

    pub fn with_code(mut self, code: NakCode) -> Self {
        self.code = Some(code);
        self
    }
}

/// Receiver of communication events
pub trait CommLogger: Send + Sync {
    fn log(&self, event: &CommEvent<'_>);
}

/// Forwards events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCommLogger;

impl CommLogger for LogCommLogger {
    fn log(&self, event: &CommEvent<'_>) {
        match event.kind {
            CommEventKind::ChannelOpened => log::info!("[{}] channel opened", event.channel),
            CommEventKind::ChannelClosed => log::info!("[{}] channel closed", event.channel),
            CommEventKind::FrameSent => {
                log::debug!("[{}] TX {}", event.channel, hex_string(event.bytes))
            }
            CommEventKind::FrameReceived => {
                log::debug!("[{}] RX {}", event.channel, hex_string(event.bytes))
            }
            CommEventKind::UnrecognizedData => log::warn!(
                "[{}] unrecognized data ({} bytes): {}",
                event.channel,
                event.bytes.len(),
                hex_string(event.bytes)
            ),
            CommEventKind::FrameRejected => match event.code {
                Some(code) => log::warn!(
                    "[{}] rejected frame, {}: {}",
                    event.channel,
                    code,
                    hex_string(event.bytes)
                ),
                None => log::warn!("[{}] rejected frame: {}", event.channel, hex_string(event.bytes)),
            },
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCommLogger;

impl CommLogger for NullCommLogger {
    fn log(&self, _event: &CommEvent<'_>) {}
}

/// Owned copy of a [`CommEvent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub kind: CommEventKind,
    pub channel: String,
    pub bytes: Vec<u8>,
    pub code: Option<NakCode>,
}

/// Keeps every event in memory, for diagnostics views and tests
#[derive(Debug, Default)]
pub struct MemoryCommLogger {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryCommLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_of(&self, kind: CommEventKind) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    pub fn count(&self, kind: CommEventKind) -> usize {
        self.events_of(kind).len()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl CommLogger for MemoryCommLogger {
    fn log(&self, event: &CommEvent<'_>) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                kind: event.kind,
                channel: event.channel.to_string(),
                bytes: event.bytes.to_vec(),
                code: event.code,
            });
        }
    }
}

/// The logger used when none is injected
pub fn default_logger() -> Arc<dyn CommLogger> {
    Arc::new(LogCommLogger)
}

/// Space-separated upper-case hex dump
pub fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}
