//! Device variable identifiers (`%MW100`-style)

use crate::datatypes::device_value::DataType;
use crate::error::{PlcError, PlcResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest variable name accepted on the wire (including `%`)
pub const MAX_VARIABLE_NAME_LENGTH: usize = 16;

static VARIABLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^%([A-Z])([XBWDL])([0-9]{1,7})$").expect("device variable pattern is valid")
});

/// A PLC device variable such as `%MW100`
///
/// Consists of a device letter (`M`, `D`, `P`, ...), an access width and
/// an index counted in units of that width. Bit indices count bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceVariable {
    device: char,
    data_type: DataType,
    index: u32,
}

impl DeviceVariable {
    pub fn new(device: char, data_type: DataType, index: u32) -> Self {
        Self {
            device: device.to_ascii_uppercase(),
            data_type,
            index,
        }
    }

    /// Parse a variable name like `%MW100` (case-insensitive)
    pub fn parse(s: &str) -> PlcResult<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let caps = VARIABLE_PATTERN
            .captures(&upper)
            .ok_or_else(|| PlcError::InvalidData(format!("Invalid device variable: {}", s)))?;

        let device = caps[1].chars().next().unwrap_or('M');
        let data_type = caps[2]
            .chars()
            .next()
            .and_then(DataType::from_letter)
            .ok_or_else(|| PlcError::InvalidData(format!("Invalid data type in: {}", s)))?;
        let index = caps[3]
            .parse::<u32>()
            .map_err(|_| PlcError::InvalidData(format!("Invalid index in: {}", s)))?;

        Ok(Self::new(device, data_type, index))
    }

    pub fn device(&self) -> char {
        self.device
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Byte offset of this variable inside its device memory
    pub fn byte_offset(&self) -> u64 {
        match self.data_type {
            DataType::Bit => self.index as u64 / 8,
            dt => self.index as u64 * dt.size() as u64,
        }
    }

    /// Bit position inside the byte at `byte_offset` (bit variables only)
    pub fn bit_position(&self) -> u8 {
        (self.index % 8) as u8
    }

    /// The variable `count` units after this one
    pub fn offset(&self, count: u32) -> Self {
        Self {
            index: self.index.saturating_add(count),
            ..*self
        }
    }
}

impl fmt::Display for DeviceVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}{}{}", self.device, self.data_type.letter(), self.index)
    }
}

impl FromStr for DeviceVariable {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let var = DeviceVariable::parse("%MW100").unwrap();
        assert_eq!(var.device(), 'M');
        assert_eq!(var.data_type(), DataType::Word);
        assert_eq!(var.index(), 100);
        assert_eq!(var.byte_offset(), 200);
    }

    #[test]
    fn test_parse_lowercase_and_display() {
        let var: DeviceVariable = "%dx17".parse().unwrap();
        assert_eq!(var.to_string(), "%DX17");
        assert_eq!(var.byte_offset(), 2);
        assert_eq!(var.bit_position(), 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DeviceVariable::parse("MW100").is_err());
        assert!(DeviceVariable::parse("%MQ100").is_err());
        assert!(DeviceVariable::parse("%MW").is_err());
    }

    #[test]
    fn test_offset() {
        let var = DeviceVariable::parse("%MD10").unwrap();
        assert_eq!(var.offset(3).to_string(), "%MD13");
    }
}
