//! FEnet request bodies
//!
//! ```text
//! command(2) data_type(2) reserved(2) block_count(2)
//!   { name_len(2) name }*block_count
//!   read continuous:  byte_count(2)
//!   write:            { data_len(2) data }*block_count
//! ```

use super::{
    put_variable, take_bytes, take_u16, take_variable, FenetCommand, FenetDataType, MAX_BLOCKS,
    MAX_DATA_BYTES,
};
use bytes::BufMut;
use plclink_core::datatypes::{DeviceValue, DeviceVariable};
use plclink_core::nak::FenetError;

#[derive(Debug, Clone, PartialEq)]
pub enum FenetRequestBody {
    /// All variables share one data type
    ReadIndividual(Vec<DeviceVariable>),
    /// `count` bytes starting at `variable`
    ReadContinuous { variable: DeviceVariable, count: u16 },
    WriteIndividual(Vec<(DeviceVariable, DeviceValue)>),
    /// Little-endian device bytes starting at `variable`
    WriteContinuous { variable: DeviceVariable, data: Vec<u8> },
}

impl FenetRequestBody {
    pub fn command(&self) -> FenetCommand {
        match self {
            FenetRequestBody::ReadIndividual(_) | FenetRequestBody::ReadContinuous { .. } => {
                FenetCommand::Read
            }
            FenetRequestBody::WriteIndividual(_) | FenetRequestBody::WriteContinuous { .. } => {
                FenetCommand::Write
            }
        }
    }

    pub fn data_type(&self) -> FenetDataType {
        match self {
            FenetRequestBody::ReadIndividual(variables) => variables
                .first()
                .map(|v| v.data_type().into())
                .unwrap_or(FenetDataType::Word),
            FenetRequestBody::WriteIndividual(items) => items
                .first()
                .map(|(v, _)| v.data_type().into())
                .unwrap_or(FenetDataType::Word),
            FenetRequestBody::ReadContinuous { .. } | FenetRequestBody::WriteContinuous { .. } => {
                FenetDataType::Continuous
            }
        }
    }

    pub fn block_count(&self) -> usize {
        match self {
            FenetRequestBody::ReadIndividual(variables) => variables.len(),
            FenetRequestBody::WriteIndividual(items) => items.len(),
            _ => 1,
        }
    }

    /// Check block and size limits before sending
    pub fn validate(&self) -> Result<(), FenetError> {
        let blocks = self.block_count();
        if blocks == 0 || blocks > MAX_BLOCKS {
            return Err(FenetError::BlockCountExceeded);
        }
        match self {
            FenetRequestBody::ReadIndividual(variables) => {
                let data_type = variables[0].data_type();
                if variables.iter().any(|v| v.data_type() != data_type) {
                    return Err(FenetError::DataType);
                }
            }
            FenetRequestBody::WriteIndividual(items) => {
                let data_type = items[0].0.data_type();
                for (variable, value) in items {
                    if variable.data_type() != data_type || value.data_type() != data_type {
                        return Err(FenetError::DataType);
                    }
                }
            }
            FenetRequestBody::ReadContinuous { count, .. } => {
                if *count == 0 || *count as usize > MAX_DATA_BYTES {
                    return Err(FenetError::DataSize);
                }
            }
            FenetRequestBody::WriteContinuous { data, .. } => {
                if data.is_empty() || data.len() > MAX_DATA_BYTES {
                    return Err(FenetError::DataSize);
                }
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u16_le(self.command().request_code());
        out.put_u16_le(self.data_type().code());
        out.put_u16_le(0);
        out.put_u16_le(self.block_count() as u16);

        match self {
            FenetRequestBody::ReadIndividual(variables) => {
                for variable in variables {
                    put_variable(&mut out, variable);
                }
            }
            FenetRequestBody::ReadContinuous { variable, count } => {
                put_variable(&mut out, variable);
                out.put_u16_le(*count);
            }
            FenetRequestBody::WriteIndividual(items) => {
                for (variable, _) in items {
                    put_variable(&mut out, variable);
                }
                for (_, value) in items {
                    let bytes = value.to_le_bytes();
                    out.put_u16_le(bytes.len() as u16);
                    out.put_slice(&bytes);
                }
            }
            FenetRequestBody::WriteContinuous { variable, data } => {
                put_variable(&mut out, variable);
                out.put_u16_le(data.len() as u16);
                out.put_slice(data);
            }
        }
        out
    }

    pub fn decode(body: &[u8]) -> Result<Self, FenetError> {
        let mut buf = body;
        let command =
            FenetCommand::from_request_code(take_u16(&mut buf)?).ok_or(FenetError::Command)?;
        let data_type =
            FenetDataType::from_code(take_u16(&mut buf)?).ok_or(FenetError::DataType)?;
        take_u16(&mut buf)?;
        let blocks = take_u16(&mut buf)? as usize;
        if blocks == 0 || blocks > MAX_BLOCKS {
            return Err(FenetError::BlockCountExceeded);
        }

        let decoded = match data_type.element_type() {
            None => {
                if blocks != 1 {
                    return Err(FenetError::BlockCountExceeded);
                }
                let variable = take_variable(&mut buf)?;
                let size = take_u16(&mut buf)?;
                if size == 0 || size as usize > MAX_DATA_BYTES {
                    return Err(FenetError::DataSize);
                }
                match command {
                    FenetCommand::Read => FenetRequestBody::ReadContinuous {
                        variable,
                        count: size,
                    },
                    FenetCommand::Write => FenetRequestBody::WriteContinuous {
                        variable,
                        data: take_bytes(&mut buf, size as usize)?.to_vec(),
                    },
                }
            }
            Some(element) => {
                let mut variables = Vec::with_capacity(blocks);
                for _ in 0..blocks {
                    let variable = take_variable(&mut buf)?;
                    if variable.data_type() != element {
                        return Err(FenetError::DataType);
                    }
                    variables.push(variable);
                }
                match command {
                    FenetCommand::Read => FenetRequestBody::ReadIndividual(variables),
                    FenetCommand::Write => {
                        let mut items = Vec::with_capacity(blocks);
                        let mut total = 0usize;
                        for variable in variables {
                            let size = take_u16(&mut buf)? as usize;
                            if size != element.size() {
                                return Err(FenetError::DataSize);
                            }
                            total += size;
                            if total > MAX_DATA_BYTES {
                                return Err(FenetError::TotalSize);
                            }
                            let value = DeviceValue::from_le_bytes(element, take_bytes(&mut buf, size)?)
                                .map_err(|_| FenetError::DataSize)?;
                            items.push((variable, value));
                        }
                        FenetRequestBody::WriteIndividual(items)
                    }
                }
            }
        };

        if !buf.is_empty() {
            return Err(FenetError::Length);
        }
        Ok(decoded)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FenetRequest {
    pub invoke_id: u16,
    pub body: FenetRequestBody,
}

impl FenetRequest {
    pub fn new(invoke_id: u16, body: FenetRequestBody) -> Self {
        Self { invoke_id, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fenet::FenetCodec;

    fn var(name: &str) -> DeviceVariable {
        DeviceVariable::parse(name).unwrap()
    }

    #[test]
    fn test_read_individual_layout() {
        let body = FenetRequestBody::ReadIndividual(vec![var("%MW100")]).encode();
        let mut expected = vec![0x54, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x06, 0x00];
        expected.extend_from_slice(b"%MW100");
        assert_eq!(body, expected);
    }

    #[test]
    fn test_write_individual_layout() {
        let body =
            FenetRequestBody::WriteIndividual(vec![(var("%DW2"), DeviceValue::Word(0x1234))])
                .encode();
        assert_eq!(&body[..8], &[0x58, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(&body[8..14], b"\x04\x00%DW2");
        assert_eq!(&body[14..], &[0x02, 0x00, 0x34, 0x12]);
    }

    #[test]
    fn test_request_roundtrip_through_codec() {
        let codec = FenetCodec::new(true);
        let requests = [
            FenetRequest::new(7, FenetRequestBody::ReadIndividual(vec![var("%MD0"), var("%MD4")])),
            FenetRequest::new(8, FenetRequestBody::ReadContinuous { variable: var("%MB0"), count: 32 }),
            FenetRequest::new(
                9,
                FenetRequestBody::WriteContinuous { variable: var("%MB10"), data: vec![1, 2, 3] },
            ),
            FenetRequest::new(
                10,
                FenetRequestBody::WriteIndividual(vec![
                    (var("%MX5"), DeviceValue::Bit(true)),
                    (var("%MX6"), DeviceValue::Bit(false)),
                ]),
            ),
        ];
        for request in requests {
            assert_eq!(request.body.validate(), Ok(()));
            let frame = codec.encode_request(&request);
            assert_eq!(codec.decode_request(&frame).unwrap(), request);
        }
    }

    #[test]
    fn test_decode_errors() {
        let mut unknown_command = FenetRequestBody::ReadIndividual(vec![var("%MW0")]).encode();
        unknown_command[0] = 0x99;
        assert_eq!(FenetRequestBody::decode(&unknown_command), Err(FenetError::Command));

        let mut unknown_type = FenetRequestBody::ReadIndividual(vec![var("%MW0")]).encode();
        unknown_type[2] = 0x09;
        assert_eq!(FenetRequestBody::decode(&unknown_type), Err(FenetError::DataType));

        let too_many = FenetRequestBody::ReadIndividual(vec![var("%MW0"); 17]);
        assert_eq!(too_many.validate(), Err(FenetError::BlockCountExceeded));
        assert_eq!(
            FenetRequestBody::decode(&too_many.encode()),
            Err(FenetError::BlockCountExceeded)
        );

        let mixed = FenetRequestBody::ReadIndividual(vec![var("%MW0"), var("%MB0")]);
        assert_eq!(mixed.validate(), Err(FenetError::DataType));
        assert_eq!(FenetRequestBody::decode(&mixed.encode()), Err(FenetError::DataType));

        let oversized = FenetRequestBody::ReadContinuous { variable: var("%MB0"), count: 1401 };
        assert_eq!(FenetRequestBody::decode(&oversized.encode()), Err(FenetError::DataSize));

        let mut bad_name = FenetRequestBody::ReadIndividual(vec![var("%MW0")]).encode();
        bad_name[10] = b'?';
        assert_eq!(FenetRequestBody::decode(&bad_name), Err(FenetError::VariableName));

        let truncated = FenetRequestBody::ReadIndividual(vec![var("%MW0")]).encode();
        assert_eq!(
            FenetRequestBody::decode(&truncated[..truncated.len() - 1]),
            Err(FenetError::Length)
        );
    }
}
