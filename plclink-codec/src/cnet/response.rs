//! Cnet responses: `ACK|NAK station command type body ETX [BCC]`

use super::{
    check_frame, finish_frame, open_frame, CnetCommand, CnetCommandType, CnetHeader, FieldReader,
    ACK, ETX, NAK,
};
use crate::framing::FrameCheck;
use crate::hex::{push_hex, push_hex_u8, push_hex_u16};
use plclink_core::nak::CnetError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CnetResponsePayload {
    /// Write or monitor registration acknowledged
    Ack,
    /// Read data, one raw big-endian block per requested item (or one block
    /// for a continuous read)
    Blocks(Vec<Vec<u8>>),
    Nak(CnetError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnetResponse {
    pub header: CnetHeader,
    pub payload: CnetResponsePayload,
}

impl CnetResponse {
    pub fn ack(header: CnetHeader) -> Self {
        Self {
            header,
            payload: CnetResponsePayload::Ack,
        }
    }

    pub fn blocks(header: CnetHeader, blocks: Vec<Vec<u8>>) -> Self {
        Self {
            header,
            payload: CnetResponsePayload::Blocks(blocks),
        }
    }

    pub fn nak(header: CnetHeader, code: CnetError) -> Self {
        Self {
            header,
            payload: CnetResponsePayload::Nak(code),
        }
    }

    pub fn nak_code(&self) -> Option<CnetError> {
        match self.payload {
            CnetResponsePayload::Nak(code) => Some(code),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let control = if self.nak_code().is_some() { NAK } else { ACK };
        let mut out = vec![control];
        self.header.push(&mut out);

        match &self.payload {
            CnetResponsePayload::Ack => {}
            CnetResponsePayload::Blocks(blocks) => {
                push_hex_u8(&mut out, blocks.len() as u8);
                for block in blocks {
                    push_hex_u8(&mut out, block.len() as u8);
                    push_hex(&mut out, block);
                }
            }
            CnetResponsePayload::Nak(code) => push_hex_u16(&mut out, code.code()),
        }

        finish_frame(&mut out, ETX, self.header.use_bcc);
        out
    }

    /// Decode a complete response frame
    pub fn decode(frame: &[u8]) -> Result<Self, CnetError> {
        let is_nak = match frame.first() {
            Some(&ACK) => false,
            Some(&NAK) => true,
            _ => return Err(CnetError::UnknownCommand),
        };
        let (body, use_bcc) = open_frame(frame, ETX)?;
        let mut reader = FieldReader::new(body);

        let station = reader.hex_u8()?;
        let command =
            CnetCommand::from_letter(reader.take(1)?[0]).ok_or(CnetError::UnknownCommand)?;
        let command_type = CnetCommandType::parse(command, reader.take(2)?)?;
        let header = CnetHeader {
            station,
            use_bcc,
            command,
            command_type,
        };

        let payload = if is_nak {
            CnetResponsePayload::Nak(CnetError::from_code(reader.hex_u16()?))
        } else {
            match command {
                CnetCommand::Read | CnetCommand::ExecuteMonitor => {
                    let count = reader.hex_u8()? as usize;
                    let mut blocks = Vec::with_capacity(count);
                    for _ in 0..count {
                        let size = reader.hex_u8()? as usize;
                        blocks.push(reader.hex_bytes(size)?);
                    }
                    CnetResponsePayload::Blocks(blocks)
                }
                CnetCommand::Write | CnetCommand::RegisterMonitor => CnetResponsePayload::Ack,
            }
        };
        reader.finish()?;

        Ok(Self { header, payload })
    }

    /// Frame boundary of a response starting at `buf[0]`
    pub fn check(buf: &[u8]) -> Result<FrameCheck, CnetError> {
        check_frame(buf, &[ACK, NAK], ETX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(command: CnetCommand, command_type: CnetCommandType, use_bcc: bool) -> CnetHeader {
        CnetHeader {
            station: 0x20,
            use_bcc,
            command,
            command_type,
        }
    }

    #[test]
    fn test_read_response() {
        let response = CnetResponse::blocks(
            header(CnetCommand::Read, CnetCommandType::Individual, false),
            vec![vec![0x12, 0x34], vec![0x00, 0x01]],
        );
        let frame = response.encode();
        assert_eq!(frame, b"\x0620RSS02021234020001\x03".to_vec());
        assert_eq!(CnetResponse::decode(&frame).unwrap(), response);
        assert_eq!(CnetResponse::check(&frame).unwrap(), FrameCheck::Complete(frame.len()));
    }

    #[test]
    fn test_nak_response_with_bcc() {
        let response = CnetResponse::nak(
            header(CnetCommand::Write, CnetCommandType::Continuous, true),
            CnetError::AreaExceeded,
        );
        let frame = response.encode();
        assert!(frame.starts_with(b"\x1520wSB7132\x03"));
        assert_eq!(frame.len(), 13);
        let decoded = CnetResponse::decode(&frame).unwrap();
        assert_eq!(decoded.nak_code(), Some(CnetError::AreaExceeded));
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_monitor_responses() {
        let registered = CnetResponse::ack(header(
            CnetCommand::RegisterMonitor,
            CnetCommandType::Monitor(2),
            false,
        ));
        assert_eq!(registered.encode(), b"\x0620X02\x03".to_vec());
        assert_eq!(CnetResponse::decode(&registered.encode()).unwrap(), registered);

        let executed = CnetResponse::blocks(
            header(CnetCommand::ExecuteMonitor, CnetCommandType::Monitor(2), false),
            vec![vec![0xAA, 0xBB, 0xCC]],
        );
        assert_eq!(executed.encode(), b"\x0620Y020103AABBCC\x03".to_vec());
        assert_eq!(CnetResponse::decode(&executed.encode()).unwrap(), executed);
    }

    #[test]
    fn test_every_response_roundtrips() {
        let responses = vec![
            CnetResponse::blocks(
                header(CnetCommand::Read, CnetCommandType::Continuous, false),
                vec![vec![0x00, 0x0A, 0x01, 0x02]],
            ),
            CnetResponse::ack(header(CnetCommand::Write, CnetCommandType::Individual, true)),
            CnetResponse::ack(header(CnetCommand::Write, CnetCommandType::Continuous, false)),
            CnetResponse::nak(
                header(CnetCommand::Read, CnetCommandType::Individual, false),
                CnetError::BlockCountExceeded,
            ),
            CnetResponse::blocks(
                header(CnetCommand::ExecuteMonitor, CnetCommandType::Monitor(0x1F), true),
                vec![vec![0x01], vec![0x02, 0x03]],
            ),
        ];
        for response in responses {
            let frame = response.encode();
            assert_eq!(CnetResponse::check(&frame).unwrap(), FrameCheck::Complete(frame.len()));
            assert_eq!(CnetResponse::decode(&frame).unwrap(), response, "{:?}", response);
        }
    }

    #[test]
    fn test_decode_truncated_block() {
        assert_eq!(
            CnetResponse::decode(b"\x0620RSS01031234\x03"),
            Err(CnetError::DataError)
        );
        assert_eq!(CnetResponse::decode(b"\x0520RSS\x03"), Err(CnetError::UnknownCommand));
    }
}
