use crate::nak::NakCode;
use thiserror::Error;

/// Main error type for plclink operations
#[derive(Error, Debug)]
pub enum PlcError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// No data or no complete frame arrived within the bound.
    ///
    /// Transport failures on an open channel also surface as `Timeout` to
    /// in-flight readers and writers.
    #[error("Timeout")]
    Timeout,

    #[error("Object has already been disposed")]
    AlreadyDisposed,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A well-formed response reporting a protocol-level failure.
    #[error("Request rejected by peer: {code}")]
    Nak {
        code: NakCode,
        /// Raw response frame as received
        response: Vec<u8>,
        /// Encoded request frame that triggered the response
        request: Vec<u8>,
    },

    /// Malformed input detected locally.
    #[error("Frame invalid: {code}")]
    Decode { code: NakCode, frame: Vec<u8> },

    #[error("Response does not match request: {0}")]
    Correlation(String),
}

impl PlcError {
    /// Build a local decode failure for `frame`.
    pub fn decode(code: impl Into<NakCode>, frame: &[u8]) -> Self {
        PlcError::Decode {
            code: code.into(),
            frame: frame.to_vec(),
        }
    }

    /// Protocol code carried by a NAK or decode failure
    pub fn nak_code(&self) -> Option<NakCode> {
        match self {
            PlcError::Nak { code, .. } | PlcError::Decode { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PlcError::Timeout)
    }
}

/// Result type alias for plclink operations
pub type PlcResult<T> = Result<T, PlcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nak::{CnetError, ModbusException};

    #[test]
    fn test_nak_code_extraction() {
        let err = PlcError::Nak {
            code: ModbusException::IllegalDataAddress.into(),
            response: vec![0x01, 0x84, 0x02],
            request: vec![],
        };
        assert_eq!(
            err.nak_code(),
            Some(NakCode::Modbus(ModbusException::IllegalDataAddress))
        );
        assert!(PlcError::Timeout.nak_code().is_none());
    }

    #[test]
    fn test_decode_display_uses_description() {
        let err = PlcError::decode(CnetError::Bcc, &[0x05]);
        let text = err.to_string();
        assert!(text.contains("BCC"), "{}", text);
    }
}
