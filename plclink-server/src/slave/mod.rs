//! Protocol slaves
//!
//! A slave turns one complete request frame into the bytes to answer with.
//! Framing and resynchronisation live in the
//! [`StreamDispatcher`](crate::dispatcher::StreamDispatcher); slaves only see
//! whole frames, or the partial frame a framing check rejected.

pub mod cnet;
pub mod fenet;
pub mod modbus;

use plclink_codec::framing::FrameCheck;
use plclink_core::nak::NakCode;

pub use cnet::CnetSlave;
pub use fenet::FenetSlave;
pub use modbus::ModbusSlave;

/// What came of one request frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Dispatched to the handler; `None` when the request takes no reply
    Handled(Option<Vec<u8>>),
    /// Not decodable; `response` is the NAK to send, if the protocol has one
    Rejected {
        code: NakCode,
        response: Option<Vec<u8>>,
    },
    /// Addressed to another station
    Ignored,
}

/// Slave side of one protocol
pub trait SlaveProtocol: Send + Sync {
    fn name(&self) -> &'static str;

    /// Bytes to collect before the first [`check_request`](Self::check_request)
    fn header_len(&self) -> usize;

    fn check_request(&self, buf: &[u8]) -> Result<FrameCheck, NakCode>;

    /// Decode and dispatch one complete frame
    fn handle_frame(&self, frame: &[u8]) -> FrameOutcome;

    /// NAK for a frame the framing check failed with `code`
    fn reject(&self, partial: &[u8], code: NakCode) -> Option<Vec<u8>>;
}
