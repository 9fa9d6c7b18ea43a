//! Checksums used by the frame codecs

use once_cell::sync::Lazy;

/// Modbus CRC16 constants
const INITIAL_CRC: u16 = 0xFFFF;
const CRC_POLY: u16 = 0xA001; // Bit-reversed 0x8005

/// Precomputed CRC16 table
static CRC_TABLE: Lazy<[u16; 256]> = Lazy::new(|| {
    let mut table = [0u16; 256];
    for b in 0..=0xFF {
        let mut v = b as u16;
        for _ in 0..8 {
            if (v & 1) == 1 {
                v = (v >> 1) ^ CRC_POLY;
            } else {
                v >>= 1;
            }
        }
        table[b as usize] = v;
    }
    table
});

/// Modbus RTU CRC16, appended to frames little-endian
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(INITIAL_CRC, |crc, &byte| {
        (crc >> 8) ^ CRC_TABLE[((crc ^ byte as u16) & 0xFF) as usize]
    })
}

/// Append the CRC16 of `frame` to it
pub fn append_crc16(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Check a frame whose last two bytes are its CRC16
pub fn verify_crc16(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let (body, crc) = frame.split_at(frame.len() - 2);
    crc16(body) == u16::from_le_bytes([crc[0], crc[1]])
}

/// Modbus ASCII LRC: two's complement of the byte sum
pub fn lrc(data: &[u8]) -> u8 {
    sum8(data).wrapping_neg()
}

/// Low byte of the additive sum
pub fn sum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_vectors() {
        let mut frame = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        append_crc16(&mut frame);
        assert_eq!(&frame[6..], &[0xC5, 0xCD]);
        assert!(verify_crc16(&frame));

        assert_eq!(crc16(&[0x01, 0x04, 0x00, 0x00, 0x00, 0x01]).to_le_bytes(), [0x31, 0xCA]);
    }

    #[test]
    fn test_crc16_detects_corruption() {
        let mut frame = vec![0x11, 0x06, 0x00, 0x01, 0x00, 0x03];
        append_crc16(&mut frame);
        frame[3] ^= 0x01;
        assert!(!verify_crc16(&frame));
        assert!(!verify_crc16(&[0x01, 0x02]));
    }

    #[test]
    fn test_lrc() {
        assert_eq!(lrc(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]), 0xFB);
        assert_eq!(lrc(&[]), 0x00);
        let data = [0x11, 0x03, 0x00, 0x6B, 0x00, 0x03];
        assert_eq!(sum8(&data).wrapping_add(lrc(&data)), 0);
    }
}
