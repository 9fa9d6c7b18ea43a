//! FEnet application header (20 bytes)
//!
//! | offset | size | field                          |
//! |--------|------|--------------------------------|
//! | 0      | 10   | company id `LSIS-XGT` + 2 zero |
//! | 10     | 2    | PLC info                       |
//! | 12     | 1    | CPU info                       |
//! | 13     | 1    | source of frame                |
//! | 14     | 2    | invoke id                      |
//! | 16     | 2    | body length                    |
//! | 18     | 1    | FEnet position                 |
//! | 19     | 1    | BCC (sum of bytes 0..19)       |

use crate::checksum::sum8;
use crate::framing::FrameCheck;
use bytes::BufMut;
use plclink_core::nak::FenetError;

pub const COMPANY_ID: &[u8; 8] = b"LSIS-XGT";
pub const HEADER_LEN: usize = 20;
/// Client to server
pub const SOURCE_CLIENT: u8 = 0x33;
/// Server to client
pub const SOURCE_SERVER: u8 = 0x11;
/// Largest body accepted: 1400 data bytes plus block overhead
pub const MAX_BODY_LEN: usize = 2048;

const LENGTH_OFFSET: usize = 16;
const BCC_OFFSET: usize = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FenetHeader {
    pub plc_info: u16,
    pub cpu_info: u8,
    pub source: u8,
    pub invoke_id: u16,
    /// Byte length of the body after the header
    pub length: u16,
    pub position: u8,
}

impl FenetHeader {
    pub fn encode(&self, use_checksum: bool) -> [u8; HEADER_LEN] {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.put_slice(COMPANY_ID);
        out.put_u16_le(0);
        out.put_u16_le(self.plc_info);
        out.put_u8(self.cpu_info);
        out.put_u8(self.source);
        out.put_u16_le(self.invoke_id);
        out.put_u16_le(self.length);
        out.put_u8(self.position);
        out.put_u8(0);

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&out);
        if use_checksum {
            header[BCC_OFFSET] = sum8(&header[..BCC_OFFSET]);
        }
        header
    }

    /// Parse and validate the header at the start of `frame`
    pub fn parse(frame: &[u8], use_checksum: bool) -> Result<Self, FenetError> {
        let header = frame.get(..HEADER_LEN).ok_or(FenetError::Length)?;
        if &header[..COMPANY_ID.len()] != COMPANY_ID {
            return Err(FenetError::Header);
        }
        if use_checksum && sum8(&header[..BCC_OFFSET]) != header[BCC_OFFSET] {
            return Err(FenetError::Checksum);
        }
        Ok(Self {
            plc_info: u16::from_le_bytes([header[10], header[11]]),
            cpu_info: header[12],
            source: header[13],
            invoke_id: u16::from_le_bytes([header[14], header[15]]),
            length: u16::from_le_bytes([header[LENGTH_OFFSET], header[LENGTH_OFFSET + 1]]),
            position: header[18],
        })
    }

    /// Invoke id of a frame whose header may fail validation
    pub fn peek_invoke_id(frame: &[u8]) -> Option<u16> {
        frame.get(14..16).map(|id| u16::from_le_bytes([id[0], id[1]]))
    }
}

/// Frame boundary of a frame starting at `buf[0]`
pub fn check(buf: &[u8]) -> Result<FrameCheck, FenetError> {
    let tag_len = buf.len().min(COMPANY_ID.len());
    if buf[..tag_len] != COMPANY_ID[..tag_len] {
        return Ok(FrameCheck::BadHeader);
    }
    if buf.len() < HEADER_LEN {
        return Ok(FrameCheck::NeedMore(HEADER_LEN - buf.len()));
    }
    let length = u16::from_le_bytes([buf[LENGTH_OFFSET], buf[LENGTH_OFFSET + 1]]) as usize;
    if length > MAX_BODY_LEN {
        return Err(FenetError::Length);
    }
    let total = HEADER_LEN + length;
    if buf.len() >= total {
        Ok(FrameCheck::Complete(total))
    } else {
        Ok(FrameCheck::NeedMore(total - buf.len()))
    }
}
