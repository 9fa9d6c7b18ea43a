//! Modbus ASCII framing: `:` + hex(station, PDU, LRC) + CR LF

use crate::checksum::lrc;
use crate::framing::FrameCheck;
use crate::hex::{decode_hex, push_hex};
use plclink_core::nak::{ModbusFrameError, NakCode};

pub const START: u8 = b':';
pub const END: &[u8; 2] = b"\r\n";
/// `:` + 2 * 255 hex digits + CR LF
pub const MAX_FRAME_LEN: usize = 513;

pub fn encode(station: u8, pdu: &[u8]) -> Vec<u8> {
    let mut binary = Vec::with_capacity(pdu.len() + 2);
    binary.push(station);
    binary.extend_from_slice(pdu);
    binary.push(lrc(&binary));

    let mut frame = Vec::with_capacity(binary.len() * 2 + 3);
    frame.push(START);
    push_hex(&mut frame, &binary);
    frame.extend_from_slice(END);
    frame
}

/// Decode a complete frame into station and PDU after verifying its LRC
pub fn decode(frame: &[u8]) -> Result<(u8, Vec<u8>), NakCode> {
    let body = frame
        .strip_prefix(&[START])
        .and_then(|rest| rest.strip_suffix(END))
        .ok_or_else(|| NakCode::from(ModbusFrameError::Header))?;
    let binary = decode_hex(body).ok_or_else(|| NakCode::from(ModbusFrameError::Header))?;
    if binary.len() < 3 {
        return Err(ModbusFrameError::Length.into());
    }
    let (data, checksum) = binary.split_at(binary.len() - 1);
    if lrc(data) != checksum[0] {
        return Err(ModbusFrameError::Checksum.into());
    }
    Ok((data[0], data[1..].to_vec()))
}

/// Requests and responses share the same delimiter-based framing
pub fn check(buf: &[u8]) -> Result<FrameCheck, NakCode> {
    match buf.first() {
        None => return Ok(FrameCheck::NeedMore(1)),
        Some(&START) => {}
        Some(_) => return Ok(FrameCheck::BadHeader),
    }
    if let Some(pos) = buf.windows(2).position(|w| w == END) {
        return Ok(FrameCheck::Complete(pos + 2));
    }
    if buf.len() >= MAX_FRAME_LEN {
        return Err(ModbusFrameError::Length.into());
    }
    Ok(FrameCheck::NeedMore(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_frame() {
        let frame = encode(0x01, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(frame, b":010300000001FB\r\n".to_vec());
        assert_eq!(decode(&frame).unwrap(), (0x01, vec![0x03, 0x00, 0x00, 0x00, 0x01]));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            decode(b":010300000001FC\r\n"),
            Err(NakCode::ModbusFrame(ModbusFrameError::Checksum))
        );
        assert_eq!(
            decode(b":01030000ZZ01FB\r\n"),
            Err(NakCode::ModbusFrame(ModbusFrameError::Header))
        );
        assert_eq!(decode(b":01FF\r\n"), Err(NakCode::ModbusFrame(ModbusFrameError::Length)));
    }

    #[test]
    fn test_check() {
        assert_eq!(check(b"x:01").unwrap(), FrameCheck::BadHeader);
        assert_eq!(check(b":0103").unwrap(), FrameCheck::NeedMore(1));
        assert_eq!(check(b":01\r\n:02").unwrap(), FrameCheck::Complete(5));
        let mut long = vec![b'0'; MAX_FRAME_LEN];
        long[0] = START;
        assert!(check(&long).is_err());
    }
}
