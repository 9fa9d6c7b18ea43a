//! Hex-as-ASCII helpers for the text protocols

/// Upper-case hex digits of `bytes`, appended to `out`
pub fn push_hex(out: &mut Vec<u8>, bytes: &[u8]) {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize]);
        out.push(DIGITS[(b & 0x0F) as usize]);
    }
}

pub fn push_hex_u8(out: &mut Vec<u8>, value: u8) {
    push_hex(out, &[value]);
}

pub fn push_hex_u16(out: &mut Vec<u8>, value: u16) {
    push_hex(out, &value.to_be_bytes());
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Decode an even-length run of hex digits
pub fn decode_hex(digits: &[u8]) -> Option<Vec<u8>> {
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| Some((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

/// Two hex digits as a byte
pub fn hex_u8(digits: &[u8]) -> Option<u8> {
    match digits {
        [hi, lo] => Some((nibble(*hi)? << 4) | nibble(*lo)?),
        _ => None,
    }
}

/// Four hex digits as a big-endian u16
pub fn hex_u16(digits: &[u8]) -> Option<u16> {
    match digits {
        [a, b, c, d] => Some(((hex_u8(&[*a, *b])? as u16) << 8) | hex_u8(&[*c, *d])? as u16),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_decode() {
        let mut out = Vec::new();
        push_hex(&mut out, &[0x00, 0x1F, 0xAB]);
        assert_eq!(out, b"001FAB");
        assert_eq!(decode_hex(b"001fAB"), Some(vec![0x00, 0x1F, 0xAB]));
        assert_eq!(decode_hex(b"0G"), None);
        assert_eq!(decode_hex(b"123"), None);
    }

    #[test]
    fn test_fixed_width() {
        assert_eq!(hex_u8(b"7F"), Some(0x7F));
        assert_eq!(hex_u16(b"1132"), Some(0x1132));
        assert_eq!(hex_u16(b"113"), None);
    }
}
