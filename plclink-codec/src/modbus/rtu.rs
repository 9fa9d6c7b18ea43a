//! Modbus RTU framing: station, PDU, CRC16 little-endian

use crate::checksum::{append_crc16, verify_crc16};
use crate::framing::FrameCheck;
use crate::modbus::pdu::{request_pdu_len, response_pdu_len};
use plclink_core::nak::{ModbusFrameError, NakCode};

/// Station + function code + CRC
pub const MIN_FRAME_LEN: usize = 4;
pub const MAX_FRAME_LEN: usize = 256;

pub fn encode(station: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(pdu.len() + 3);
    frame.push(station);
    frame.extend_from_slice(pdu);
    append_crc16(&mut frame);
    frame
}

/// Split a complete frame into station and PDU after verifying its CRC
pub fn decode(frame: &[u8]) -> Result<(u8, &[u8]), NakCode> {
    if frame.len() < MIN_FRAME_LEN || frame.len() > MAX_FRAME_LEN {
        return Err(ModbusFrameError::Length.into());
    }
    if !verify_crc16(frame) {
        return Err(ModbusFrameError::Checksum.into());
    }
    Ok((frame[0], &frame[1..frame.len() - 2]))
}

fn check(buf: &[u8], pdu_len: fn(&[u8]) -> Result<FrameCheck, NakCode>) -> Result<FrameCheck, NakCode> {
    if buf.len() < 2 {
        return Ok(FrameCheck::NeedMore(2 - buf.len()));
    }
    match pdu_len(&buf[1..])? {
        FrameCheck::Complete(n) => {
            let total = 1 + n + 2;
            if total > MAX_FRAME_LEN {
                return Err(ModbusFrameError::Length.into());
            }
            if buf.len() >= total {
                Ok(FrameCheck::Complete(total))
            } else {
                Ok(FrameCheck::NeedMore(total - buf.len()))
            }
        }
        other => Ok(other),
    }
}

pub fn check_request(buf: &[u8]) -> Result<FrameCheck, NakCode> {
    check(buf, request_pdu_len)
}

pub fn check_response(buf: &[u8]) -> Result<FrameCheck, NakCode> {
    check(buf, response_pdu_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_frame() {
        let frame = encode(0x01, &[0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(frame, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]);
        let (station, pdu) = decode(&frame).unwrap();
        assert_eq!(station, 1);
        assert_eq!(pdu, &[0x03, 0x00, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn test_decode_bad_crc() {
        let mut frame = encode(0x01, &[0x06, 0x00, 0x01, 0x00, 0x03]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert_eq!(decode(&frame), Err(NakCode::ModbusFrame(ModbusFrameError::Checksum)));
        assert_eq!(decode(&[0x01, 0x03]), Err(NakCode::ModbusFrame(ModbusFrameError::Length)));
    }

    #[test]
    fn test_check_lengths() {
        let request = encode(0x11, &[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0, 10, 1, 2]);
        assert_eq!(check_request(&request[..1]).unwrap(), FrameCheck::NeedMore(1));
        assert_eq!(check_request(&request[..4]).unwrap(), FrameCheck::NeedMore(3));
        assert_eq!(check_request(&request[..7]).unwrap(), FrameCheck::NeedMore(6));
        assert_eq!(check_request(&request).unwrap(), FrameCheck::Complete(13));

        let response = encode(0x11, &[0x03, 0x04, 0, 1, 0, 2]);
        assert_eq!(check_response(&response[..3]).unwrap(), FrameCheck::NeedMore(6));
        assert_eq!(check_response(&response).unwrap(), FrameCheck::Complete(9));

        let exception = encode(0x11, &[0x83, 0x02]);
        assert_eq!(check_response(&exception).unwrap(), FrameCheck::Complete(5));
    }
}
