//! FEnet response bodies
//!
//! ```text
//! command(2) data_type(2) reserved(2) error_status(2)
//!   error:  error_code(2)
//!   read:   block_count(2) { data_len(2) data }*block_count
//!   write:  block_count(2)
//! ```

use super::{take_bytes, take_u16, FenetCommand, MAX_BLOCKS};
use bytes::BufMut;
use plclink_core::nak::FenetError;

const STATUS_OK: u16 = 0x0000;
const STATUS_ERROR: u16 = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenetResponseBody {
    /// One little-endian data block per requested variable, or one block
    /// for a continuous read
    Read(Vec<Vec<u8>>),
    Write { blocks: u16 },
    Error(FenetError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenetResponse {
    pub invoke_id: u16,
    pub command: FenetCommand,
    /// Data type code echoed from the request
    pub data_type: u16,
    pub body: FenetResponseBody,
}

impl FenetResponse {
    pub fn error(&self) -> Option<FenetError> {
        match self.body {
            FenetResponseBody::Error(code) => Some(code),
            _ => None,
        }
    }

    pub fn blocks(&self) -> &[Vec<u8>] {
        match &self.body {
            FenetResponseBody::Read(blocks) => blocks,
            _ => &[],
        }
    }

    pub(crate) fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u16_le(self.command.response_code());
        out.put_u16_le(self.data_type);
        out.put_u16_le(0);

        match &self.body {
            FenetResponseBody::Error(code) => {
                out.put_u16_le(STATUS_ERROR);
                out.put_u16_le(code.code());
            }
            FenetResponseBody::Read(blocks) => {
                out.put_u16_le(STATUS_OK);
                out.put_u16_le(blocks.len() as u16);
                for block in blocks {
                    out.put_u16_le(block.len() as u16);
                    out.put_slice(block);
                }
            }
            FenetResponseBody::Write { blocks } => {
                out.put_u16_le(STATUS_OK);
                out.put_u16_le(*blocks);
            }
        }
        out
    }

    pub(crate) fn decode_body(invoke_id: u16, body: &[u8]) -> Result<Self, FenetError> {
        let mut buf = body;
        let command =
            FenetCommand::from_response_code(take_u16(&mut buf)?).ok_or(FenetError::Command)?;
        let data_type = take_u16(&mut buf)?;
        take_u16(&mut buf)?;
        let status = take_u16(&mut buf)?;

        let decoded = if status != STATUS_OK {
            FenetResponseBody::Error(FenetError::from_code(take_u16(&mut buf)?))
        } else {
            let count = take_u16(&mut buf)?;
            if count as usize > MAX_BLOCKS {
                return Err(FenetError::BlockCountExceeded);
            }
            match command {
                FenetCommand::Read => {
                    let mut blocks = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        let size = take_u16(&mut buf)? as usize;
                        blocks.push(take_bytes(&mut buf, size)?.to_vec());
                    }
                    FenetResponseBody::Read(blocks)
                }
                FenetCommand::Write => FenetResponseBody::Write { blocks: count },
            }
        };

        if !buf.is_empty() {
            return Err(FenetError::Length);
        }
        Ok(Self {
            invoke_id,
            command,
            data_type,
            body: decoded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fenet::{FenetCodec, FenetDataType, HEADER_LEN, SOURCE_SERVER};

    #[test]
    fn test_read_response() {
        let codec = FenetCodec::new(false);
        let response = FenetResponse {
            invoke_id: 0x1234,
            command: FenetCommand::Read,
            data_type: FenetDataType::Word.code(),
            body: FenetResponseBody::Read(vec![vec![0x34, 0x12], vec![0x01, 0x00]]),
        };
        let frame = codec.encode_response(&response);
        assert_eq!(frame[13], SOURCE_SERVER);
        assert_eq!(
            &frame[HEADER_LEN..],
            &[
                0x55, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x02, 0x00, 0x34,
                0x12, 0x02, 0x00, 0x01, 0x00
            ]
        );
        assert_eq!(codec.decode_response(&frame).unwrap(), response);
    }

    #[test]
    fn test_error_response() {
        let codec = FenetCodec::new(true);
        let response = FenetResponse {
            invoke_id: 3,
            command: FenetCommand::Write,
            data_type: FenetDataType::Continuous.code(),
            body: FenetResponseBody::Error(FenetError::AreaExceeded),
        };
        let frame = codec.encode_response(&response);
        assert_eq!(&frame[HEADER_LEN + 6..], &[0xFF, 0xFF, 0x04, 0x00]);
        let decoded = codec.decode_response(&frame).unwrap();
        assert_eq!(decoded.error(), Some(FenetError::AreaExceeded));
        assert!(decoded.blocks().is_empty());
    }

    #[test]
    fn test_write_response() {
        let codec = FenetCodec::default();
        let response = FenetResponse {
            invoke_id: 9,
            command: FenetCommand::Write,
            data_type: FenetDataType::Word.code(),
            body: FenetResponseBody::Write { blocks: 1 },
        };
        let frame = codec.encode_response(&response);
        assert_eq!(codec.decode_response(&frame).unwrap(), response);
    }
}
