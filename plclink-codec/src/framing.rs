//! Incremental frame boundary detection
//!
//! Readers pull bytes from a channel and ask the codec, after every read,
//! whether the bytes collected so far form a complete frame.

/// Result of inspecting a frame prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCheck {
    /// `buf[..n]` is one complete frame
    Complete(usize),
    /// At least `n` more bytes are needed
    NeedMore(usize),
    /// The first byte cannot start a frame; drop it and retry
    BadHeader,
}
