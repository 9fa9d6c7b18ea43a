//! LS XGT FEnet codec
//!
//! FEnet frames are a 20-byte application header followed by a binary,
//! little-endian body. The header BCC is optional and switched by
//! [`FenetCodec::use_checksum`].

pub mod header;
pub mod request;
pub mod response;

use crate::framing::FrameCheck;
use bytes::{Buf, BufMut};
use plclink_core::datatypes::{DataType, DeviceVariable, MAX_VARIABLE_NAME_LENGTH};
use plclink_core::nak::FenetError;

pub use header::{FenetHeader, HEADER_LEN, SOURCE_CLIENT, SOURCE_SERVER};
pub use request::{FenetRequest, FenetRequestBody};
pub use response::{FenetResponse, FenetResponseBody};

/// Individual requests address at most this many variables
pub const MAX_BLOCKS: usize = 16;
/// Largest continuous access, and largest total write data, in bytes
pub const MAX_DATA_BYTES: usize = 1400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenetCommand {
    Read,
    Write,
}

impl FenetCommand {
    pub fn request_code(self) -> u16 {
        match self {
            FenetCommand::Read => 0x0054,
            FenetCommand::Write => 0x0058,
        }
    }

    pub fn response_code(self) -> u16 {
        self.request_code() + 1
    }

    pub fn from_request_code(code: u16) -> Option<Self> {
        match code {
            0x0054 => Some(FenetCommand::Read),
            0x0058 => Some(FenetCommand::Write),
            _ => None,
        }
    }

    pub fn from_response_code(code: u16) -> Option<Self> {
        match code {
            0x0055 => Some(FenetCommand::Read),
            0x0059 => Some(FenetCommand::Write),
            _ => None,
        }
    }
}

/// Data type field of a request body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FenetDataType {
    Bit,
    Byte,
    Word,
    DoubleWord,
    LongWord,
    Continuous,
}

impl FenetDataType {
    pub fn code(self) -> u16 {
        match self {
            FenetDataType::Bit => 0x00,
            FenetDataType::Byte => 0x01,
            FenetDataType::Word => 0x02,
            FenetDataType::DoubleWord => 0x03,
            FenetDataType::LongWord => 0x04,
            FenetDataType::Continuous => 0x14,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x00 => Some(FenetDataType::Bit),
            0x01 => Some(FenetDataType::Byte),
            0x02 => Some(FenetDataType::Word),
            0x03 => Some(FenetDataType::DoubleWord),
            0x04 => Some(FenetDataType::LongWord),
            0x14 => Some(FenetDataType::Continuous),
            _ => None,
        }
    }

    /// Element type of an individual access, `None` for continuous
    pub fn element_type(self) -> Option<DataType> {
        match self {
            FenetDataType::Bit => Some(DataType::Bit),
            FenetDataType::Byte => Some(DataType::Byte),
            FenetDataType::Word => Some(DataType::Word),
            FenetDataType::DoubleWord => Some(DataType::DoubleWord),
            FenetDataType::LongWord => Some(DataType::LongWord),
            FenetDataType::Continuous => None,
        }
    }
}

impl From<DataType> for FenetDataType {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::Bit => FenetDataType::Bit,
            DataType::Byte => FenetDataType::Byte,
            DataType::Word => FenetDataType::Word,
            DataType::DoubleWord => FenetDataType::DoubleWord,
            DataType::LongWord => FenetDataType::LongWord,
        }
    }
}

/// Header settings shared by both directions of a FEnet link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenetCodec {
    /// Write and verify the header BCC
    pub use_checksum: bool,
    pub plc_info: u16,
    pub cpu_info: u8,
    pub position: u8,
}

impl Default for FenetCodec {
    fn default() -> Self {
        Self {
            use_checksum: true,
            plc_info: 0,
            cpu_info: 0xA0,
            position: 0,
        }
    }
}

impl FenetCodec {
    pub fn new(use_checksum: bool) -> Self {
        Self {
            use_checksum,
            ..Self::default()
        }
    }

    pub fn encode_request(&self, request: &FenetRequest) -> Vec<u8> {
        self.frame(SOURCE_CLIENT, request.invoke_id, request.body.encode())
    }

    pub fn decode_request(&self, frame: &[u8]) -> Result<FenetRequest, FenetError> {
        let (header, body) = self.open(frame)?;
        Ok(FenetRequest {
            invoke_id: header.invoke_id,
            body: FenetRequestBody::decode(body)?,
        })
    }

    pub fn encode_response(&self, response: &FenetResponse) -> Vec<u8> {
        self.frame(SOURCE_SERVER, response.invoke_id, response.encode_body())
    }

    pub fn decode_response(&self, frame: &[u8]) -> Result<FenetResponse, FenetError> {
        let (header, body) = self.open(frame)?;
        FenetResponse::decode_body(header.invoke_id, body)
    }

    /// Frame boundary of a frame starting at `buf[0]`
    pub fn check(&self, buf: &[u8]) -> Result<FrameCheck, FenetError> {
        header::check(buf)
    }

    /// Error response for a request that could only be partially parsed
    ///
    /// Echoes whatever of invoke id, command and data type is readable.
    pub fn reject(&self, frame: &[u8], code: FenetError) -> FenetResponse {
        let field = |at: usize| {
            frame
                .get(HEADER_LEN + at..HEADER_LEN + at + 2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
        };
        FenetResponse {
            invoke_id: FenetHeader::peek_invoke_id(frame).unwrap_or(0),
            command: field(0)
                .and_then(FenetCommand::from_request_code)
                .unwrap_or(FenetCommand::Read),
            data_type: field(2).unwrap_or(0),
            body: FenetResponseBody::Error(code),
        }
    }

    fn frame(&self, source: u8, invoke_id: u16, body: Vec<u8>) -> Vec<u8> {
        let header = FenetHeader {
            plc_info: self.plc_info,
            cpu_info: self.cpu_info,
            source,
            invoke_id,
            length: body.len() as u16,
            position: self.position,
        };
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.put_slice(&header.encode(self.use_checksum));
        out.put_slice(&body);
        out
    }

    fn open<'a>(&self, frame: &'a [u8]) -> Result<(FenetHeader, &'a [u8]), FenetError> {
        let header = FenetHeader::parse(frame, self.use_checksum)?;
        let body = &frame[HEADER_LEN..];
        if body.len() != header.length as usize {
            return Err(FenetError::Length);
        }
        Ok((header, body))
    }
}

pub(crate) fn take_u16(buf: &mut &[u8]) -> Result<u16, FenetError> {
    if buf.remaining() < 2 {
        return Err(FenetError::Length);
    }
    Ok(buf.get_u16_le())
}

pub(crate) fn take_bytes<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8], FenetError> {
    if buf.remaining() < n {
        return Err(FenetError::Length);
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

pub(crate) fn take_variable(buf: &mut &[u8]) -> Result<DeviceVariable, FenetError> {
    let len = take_u16(buf)? as usize;
    if len == 0 || len > MAX_VARIABLE_NAME_LENGTH {
        return Err(FenetError::VariableName);
    }
    let name = std::str::from_utf8(take_bytes(buf, len)?).map_err(|_| FenetError::VariableName)?;
    DeviceVariable::parse(name).map_err(|_| FenetError::VariableName)
}

pub(crate) fn put_variable(out: &mut Vec<u8>, variable: &DeviceVariable) {
    let name = variable.to_string();
    out.put_u16_le(name.len() as u16);
    out.put_slice(name.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_codes() {
        for code in [0x00, 0x01, 0x02, 0x03, 0x04, 0x14] {
            assert_eq!(FenetDataType::from_code(code).map(|t| t.code()), Some(code));
        }
        assert_eq!(FenetDataType::from_code(0x09), None);
        assert_eq!(FenetDataType::from(DataType::Word), FenetDataType::Word);
        assert_eq!(FenetDataType::Continuous.element_type(), None);
    }

    #[test]
    fn test_reject_partial_frame() {
        let codec = FenetCodec::new(true);
        let request = FenetRequest::new(
            0x0042,
            FenetRequestBody::ReadIndividual(vec![DeviceVariable::parse("%MW0").unwrap()]),
        );
        let mut frame = codec.encode_request(&request);
        frame[19] ^= 0xFF;
        assert_eq!(codec.decode_request(&frame), Err(FenetError::Checksum));

        let nak = codec.reject(&frame, FenetError::Checksum);
        assert_eq!(nak.invoke_id, 0x0042);
        assert_eq!(nak.command, FenetCommand::Read);
        assert_eq!(nak.data_type, FenetDataType::Word.code());
        assert_eq!(nak.error(), Some(FenetError::Checksum));

        let short = codec.reject(b"LSIS-X", FenetError::Header);
        assert_eq!(short.invoke_id, 0);
    }

    #[test]
    fn test_length_mismatch() {
        let codec = FenetCodec::new(false);
        let request = FenetRequest::new(
            1,
            FenetRequestBody::ReadIndividual(vec![DeviceVariable::parse("%MB3").unwrap()]),
        );
        let mut frame = codec.encode_request(&request);
        frame.push(0);
        assert_eq!(codec.decode_request(&frame), Err(FenetError::Length));
    }
}
