//! Register and bit packing helpers
//!
//! Multi-register values are stored high word first.

/// Pack bits LSB-first into bytes
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, _) in bits.iter().enumerate().filter(|(_, on)| **on) {
        bytes[i / 8] |= 1 << (i % 8);
    }
    bytes
}

/// Unpack `count` bits LSB-first; missing bytes read as zero
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0))
        .collect()
}

pub fn u32_to_registers(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

pub fn f32_to_registers(value: f32) -> [u16; 2] {
    u32_to_registers(value.to_bits())
}

pub fn f64_to_registers(value: f64) -> [u16; 4] {
    let bits = value.to_bits();
    [
        (bits >> 48) as u16,
        (bits >> 32) as u16,
        (bits >> 16) as u16,
        bits as u16,
    ]
}

/// Consecutive register pairs as u32; a trailing odd register is ignored
pub fn registers_to_u32s(registers: &[u16]) -> Vec<u32> {
    registers
        .chunks_exact(2)
        .map(|pair| ((pair[0] as u32) << 16) | pair[1] as u32)
        .collect()
}

pub fn registers_to_f64s(registers: &[u16]) -> Vec<f64> {
    registers
        .chunks_exact(4)
        .map(|quad| {
            let bits = quad.iter().fold(0u64, |acc, r| (acc << 16) | *r as u64);
            f64::from_bits(bits)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits() {
        let bits = [true, false, false, false, false, false, false, false, true];
        let packed = pack_bits(&bits);
        assert_eq!(packed, vec![0x01, 0x01]);
        assert_eq!(unpack_bits(&packed, 9), bits.to_vec());
        assert!(!unpack_bits(&[0xFF], 10)[9]);
    }

    #[test]
    fn test_float_registers() {
        assert_eq!(f32_to_registers(4.56), [0x4091, 0xEB85]);
        let doubles = registers_to_f64s(&f64_to_registers(-12.5));
        assert_eq!(doubles, vec![-12.5]);
        assert_eq!(registers_to_u32s(&[0x0001, 0x0002, 0x0003]), vec![0x0001_0002]);
    }
}
