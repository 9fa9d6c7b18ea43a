//! Modbus TCP framing: MBAP header + PDU

use crate::framing::FrameCheck;
use plclink_core::nak::{ModbusFrameError, NakCode};

/// Transaction id, protocol id, length, unit id
pub const MBAP_HEADER_LEN: usize = 7;
/// Unit id + maximum PDU
pub const MAX_MBAP_LENGTH: usize = 254;
const PROTOCOL_ID: u16 = 0;

/// MBAP header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Byte count of unit id + PDU
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let header = buf.get(..MBAP_HEADER_LEN)?;
        Some(Self {
            transaction_id: u16::from_be_bytes([header[0], header[1]]),
            protocol_id: u16::from_be_bytes([header[2], header[3]]),
            length: u16::from_be_bytes([header[4], header[5]]),
            unit_id: header[6],
        })
    }
}

pub fn encode(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
    frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
    frame.push(unit_id);
    frame.extend_from_slice(pdu);
    frame
}

pub fn decode(frame: &[u8]) -> Result<(MbapHeader, &[u8]), NakCode> {
    let header = MbapHeader::parse(frame).ok_or_else(|| NakCode::from(ModbusFrameError::Length))?;
    if header.protocol_id != PROTOCOL_ID {
        return Err(ModbusFrameError::Header.into());
    }
    if header.length as usize + 6 != frame.len() || header.length < 2 {
        return Err(ModbusFrameError::Length.into());
    }
    Ok((header, &frame[MBAP_HEADER_LEN..]))
}

/// Requests and responses share the same length-prefixed framing
pub fn check(buf: &[u8]) -> Result<FrameCheck, NakCode> {
    let Some(header) = MbapHeader::parse(buf) else {
        return Ok(FrameCheck::NeedMore(MBAP_HEADER_LEN - buf.len()));
    };
    if header.protocol_id != PROTOCOL_ID {
        return Ok(FrameCheck::BadHeader);
    }
    let length = header.length as usize;
    if !(2..=MAX_MBAP_LENGTH).contains(&length) {
        return Err(ModbusFrameError::Length.into());
    }
    let total = 6 + length;
    if buf.len() >= total {
        Ok(FrameCheck::Complete(total))
    } else {
        Ok(FrameCheck::NeedMore(total - buf.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let frame = encode(0x1234, 0x11, &[0x04, 0x00, 0x64, 0x00, 0x04]);
        assert_eq!(
            frame,
            vec![0x12, 0x34, 0x00, 0x00, 0x00, 0x06, 0x11, 0x04, 0x00, 0x64, 0x00, 0x04]
        );
        let (header, pdu) = decode(&frame).unwrap();
        assert_eq!(header.transaction_id, 0x1234);
        assert_eq!(header.unit_id, 0x11);
        assert_eq!(pdu, &[0x04, 0x00, 0x64, 0x00, 0x04]);
        assert_eq!(check(&frame).unwrap(), FrameCheck::Complete(12));
        assert_eq!(check(&frame[..9]).unwrap(), FrameCheck::NeedMore(3));
    }

    #[test]
    fn test_check_rejects() {
        assert_eq!(check(&[0, 1, 0, 9, 0, 6, 1]).unwrap(), FrameCheck::BadHeader);
        assert!(check(&[0, 1, 0, 0, 0x01, 0x00, 1]).is_err());
        assert_eq!(check(&[0, 1]).unwrap(), FrameCheck::NeedMore(5));
    }
}
