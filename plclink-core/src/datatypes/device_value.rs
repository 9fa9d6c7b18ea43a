//! Device value types for PLC memory access

use crate::error::{PlcError, PlcResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access width of a device variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Single bit (X)
    Bit,
    /// 8-bit (B)
    Byte,
    /// 16-bit (W)
    Word,
    /// 32-bit (D)
    DoubleWord,
    /// 64-bit (L)
    LongWord,
}

impl DataType {
    /// Number of bytes a value of this type occupies on the wire.
    ///
    /// Bits travel as one byte (0x00 / 0x01).
    pub fn size(&self) -> usize {
        match self {
            DataType::Bit | DataType::Byte => 1,
            DataType::Word => 2,
            DataType::DoubleWord => 4,
            DataType::LongWord => 8,
        }
    }

    /// Size letter used in variable names (`%MW100` -> `W`)
    pub fn letter(&self) -> char {
        match self {
            DataType::Bit => 'X',
            DataType::Byte => 'B',
            DataType::Word => 'W',
            DataType::DoubleWord => 'D',
            DataType::LongWord => 'L',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'X' => Some(DataType::Bit),
            'B' => Some(DataType::Byte),
            'W' => Some(DataType::Word),
            'D' => Some(DataType::DoubleWord),
            'L' => Some(DataType::LongWord),
            _ => None,
        }
    }
}

/// A single value read from or written to PLC memory
///
/// The accessors reinterpret the stored bits the way an overlapping
/// little-endian union would: narrowing keeps the low bytes, widening
/// zero-extends, and the float views reinterpret the raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceValue {
    Bit(bool),
    Byte(u8),
    Word(u16),
    DoubleWord(u32),
    LongWord(u64),
}

impl DeviceValue {
    /// Zero value of the given type
    pub fn zero(data_type: DataType) -> Self {
        match data_type {
            DataType::Bit => DeviceValue::Bit(false),
            DataType::Byte => DeviceValue::Byte(0),
            DataType::Word => DeviceValue::Word(0),
            DataType::DoubleWord => DeviceValue::DoubleWord(0),
            DataType::LongWord => DeviceValue::LongWord(0),
        }
    }

    /// Build a value of `data_type` from raw bits, truncating as needed
    pub fn from_raw(data_type: DataType, raw: u64) -> Self {
        match data_type {
            DataType::Bit => DeviceValue::Bit(raw & 1 != 0),
            DataType::Byte => DeviceValue::Byte(raw as u8),
            DataType::Word => DeviceValue::Word(raw as u16),
            DataType::DoubleWord => DeviceValue::DoubleWord(raw as u32),
            DataType::LongWord => DeviceValue::LongWord(raw),
        }
    }

    pub fn from_i16(value: i16) -> Self {
        DeviceValue::Word(value as u16)
    }

    pub fn from_i32(value: i32) -> Self {
        DeviceValue::DoubleWord(value as u32)
    }

    pub fn from_i64(value: i64) -> Self {
        DeviceValue::LongWord(value as u64)
    }

    pub fn from_f32(value: f32) -> Self {
        DeviceValue::DoubleWord(value.to_bits())
    }

    pub fn from_f64(value: f64) -> Self {
        DeviceValue::LongWord(value.to_bits())
    }

    pub fn data_type(&self) -> DataType {
        match self {
            DeviceValue::Bit(_) => DataType::Bit,
            DeviceValue::Byte(_) => DataType::Byte,
            DeviceValue::Word(_) => DataType::Word,
            DeviceValue::DoubleWord(_) => DataType::DoubleWord,
            DeviceValue::LongWord(_) => DataType::LongWord,
        }
    }

    /// Raw bits, zero-extended to 64 bits
    pub fn raw(&self) -> u64 {
        match *self {
            DeviceValue::Bit(b) => b as u64,
            DeviceValue::Byte(v) => v as u64,
            DeviceValue::Word(v) => v as u64,
            DeviceValue::DoubleWord(v) => v as u64,
            DeviceValue::LongWord(v) => v,
        }
    }

    pub fn as_bool(&self) -> bool {
        self.raw() != 0
    }

    pub fn as_u8(&self) -> u8 {
        self.raw() as u8
    }

    pub fn as_i8(&self) -> i8 {
        self.raw() as u8 as i8
    }

    pub fn as_u16(&self) -> u16 {
        self.raw() as u16
    }

    pub fn as_i16(&self) -> i16 {
        self.raw() as u16 as i16
    }

    pub fn as_u32(&self) -> u32 {
        self.raw() as u32
    }

    pub fn as_i32(&self) -> i32 {
        self.raw() as u32 as i32
    }

    pub fn as_u64(&self) -> u64 {
        self.raw()
    }

    pub fn as_i64(&self) -> i64 {
        self.raw() as i64
    }

    pub fn as_f32(&self) -> f32 {
        f32::from_bits(self.as_u32())
    }

    pub fn as_f64(&self) -> f64 {
        f64::from_bits(self.raw())
    }

    /// Encode as little-endian bytes (`data_type().size()` bytes)
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let size = self.data_type().size();
        self.raw().to_le_bytes()[..size].to_vec()
    }

    /// Encode as big-endian bytes (`data_type().size()` bytes)
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut bytes = self.to_le_bytes();
        bytes.reverse();
        bytes
    }

    /// Decode little-endian bytes; `bytes` must be exactly the type's size
    pub fn from_le_bytes(data_type: DataType, bytes: &[u8]) -> PlcResult<Self> {
        if bytes.len() != data_type.size() {
            return Err(PlcError::InvalidData(format!(
                "{:?} value needs {} bytes, got {}",
                data_type,
                data_type.size(),
                bytes.len()
            )));
        }
        let mut raw = [0u8; 8];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self::from_raw(data_type, u64::from_le_bytes(raw)))
    }

    /// Decode big-endian bytes; `bytes` must be exactly the type's size
    pub fn from_be_bytes(data_type: DataType, bytes: &[u8]) -> PlcResult<Self> {
        let mut le = bytes.to_vec();
        le.reverse();
        Self::from_le_bytes(data_type, &le)
    }
}

impl fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceValue::Bit(b) => write!(f, "{}", *b as u8),
            DeviceValue::Byte(v) => write!(f, "0x{:02X}", v),
            DeviceValue::Word(v) => write!(f, "0x{:04X}", v),
            DeviceValue::DoubleWord(v) => write!(f, "0x{:08X}", v),
            DeviceValue::LongWord(v) => write!(f, "0x{:016X}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_views() {
        let value = DeviceValue::from_i16(-2);
        assert_eq!(value, DeviceValue::Word(0xFFFE));
        assert_eq!(value.as_i16(), -2);
        assert_eq!(value.as_u8(), 0xFE);
        assert_eq!(value.as_i32(), 0xFFFE);
    }

    #[test]
    fn test_float_views() {
        let value = DeviceValue::from_f32(1.23);
        assert_eq!(value.data_type(), DataType::DoubleWord);
        assert_eq!(value.as_f32(), 1.23);

        let value = DeviceValue::from_f64(-4.56);
        assert_eq!(value.as_f64(), -4.56);
    }

    #[test]
    fn test_byte_order() {
        let value = DeviceValue::DoubleWord(0x1122_3344);
        assert_eq!(value.to_le_bytes(), vec![0x44, 0x33, 0x22, 0x11]);
        assert_eq!(value.to_be_bytes(), vec![0x11, 0x22, 0x33, 0x44]);
        assert_eq!(
            DeviceValue::from_be_bytes(DataType::DoubleWord, &[0x11, 0x22, 0x33, 0x44]).unwrap(),
            value
        );
        assert_eq!(DeviceValue::Bit(true).to_le_bytes(), vec![0x01]);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        assert!(DeviceValue::from_le_bytes(DataType::Word, &[0x01]).is_err());
    }

    #[test]
    fn test_letters() {
        for dt in [
            DataType::Bit,
            DataType::Byte,
            DataType::Word,
            DataType::DoubleWord,
            DataType::LongWord,
        ] {
            assert_eq!(DataType::from_letter(dt.letter()), Some(dt));
        }
        assert_eq!(DataType::from_letter('q'), None);
    }
}
