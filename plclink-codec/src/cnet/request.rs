//! Cnet requests: `ENQ station command type body EOT [BCC]`

use super::{
    check_frame, finish_frame, open_frame, push_variable, CnetCommand, CnetCommandType, CnetHeader,
    FieldReader, ENQ, EOT, MAX_BLOCKS, MAX_CONTINUOUS_BYTES, MAX_MONITOR_NUMBER,
};
use crate::framing::FrameCheck;
use crate::hex::{push_hex, push_hex_u8};
use plclink_core::datatypes::{DataType, DeviceValue, DeviceVariable, MAX_VARIABLE_NAME_LENGTH};
use plclink_core::nak::CnetError;

/// A read, either a list of variables or a run from one start variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CnetRead {
    /// `RSS`
    Individual(Vec<DeviceVariable>),
    /// `RSB`; `count` is in items of the variable's type
    Continuous { variable: DeviceVariable, count: u8 },
}

impl CnetRead {
    fn command_type(&self) -> CnetCommandType {
        match self {
            CnetRead::Individual(_) => CnetCommandType::Individual,
            CnetRead::Continuous { .. } => CnetCommandType::Continuous,
        }
    }

    /// Data type of the requested items
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            CnetRead::Individual(variables) => variables.first().map(|v| v.data_type()),
            CnetRead::Continuous { variable, .. } => Some(variable.data_type()),
        }
    }

    fn validate(&self) -> Result<(), CnetError> {
        match self {
            CnetRead::Individual(variables) => validate_blocks(variables.iter()),
            CnetRead::Continuous { variable, count } => {
                validate_continuous(variable, *count as usize)
            }
        }
    }

    fn push(&self, out: &mut Vec<u8>) {
        match self {
            CnetRead::Individual(variables) => {
                push_hex_u8(out, variables.len() as u8);
                for variable in variables {
                    push_variable(out, variable);
                }
            }
            CnetRead::Continuous { variable, count } => {
                push_variable(out, variable);
                push_hex_u8(out, *count);
            }
        }
    }

    fn parse(command_type: CnetCommandType, reader: &mut FieldReader<'_>) -> Result<Self, CnetError> {
        let read = match command_type {
            CnetCommandType::Individual => {
                let blocks = reader.hex_u8()? as usize;
                let variables = (0..blocks.min(MAX_BLOCKS + 1))
                    .map(|_| reader.variable())
                    .collect::<Result<Vec<_>, _>>()?;
                CnetRead::Individual(variables)
            }
            CnetCommandType::Continuous => {
                let variable = reader.variable()?;
                let count = reader.hex_u8()?;
                CnetRead::Continuous { variable, count }
            }
            CnetCommandType::Monitor(_) => return Err(CnetError::UnknownCommand),
        };
        read.validate()?;
        Ok(read)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CnetRequestBody {
    Read(CnetRead),
    /// `WSS`
    WriteIndividual(Vec<(DeviceVariable, DeviceValue)>),
    /// `WSB`; values take the variable's type
    WriteContinuous {
        variable: DeviceVariable,
        values: Vec<DeviceValue>,
    },
    /// `X##`: store a read under a monitor number
    RegisterMonitor { monitor: u8, read: CnetRead },
    /// `Y##`: run a registered read
    ExecuteMonitor { monitor: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnetRequest {
    pub station: u8,
    /// Send a lower-case command letter and append a BCC
    pub use_bcc: bool,
    pub body: CnetRequestBody,
}

fn validate_blocks<'a>(variables: impl Iterator<Item = &'a DeviceVariable>) -> Result<(), CnetError> {
    let mut count = 0;
    let mut data_type = None;
    for variable in variables {
        count += 1;
        if variable.to_string().len() > MAX_VARIABLE_NAME_LENGTH {
            return Err(CnetError::VariableLength);
        }
        match data_type {
            None => data_type = Some(variable.data_type()),
            Some(dt) if dt != variable.data_type() => return Err(CnetError::DataTypeMismatch),
            Some(_) => {}
        }
    }
    match count {
        0 => Err(CnetError::DataError),
        n if n > MAX_BLOCKS => Err(CnetError::BlockCountExceeded),
        _ => Ok(()),
    }
}

fn validate_continuous(variable: &DeviceVariable, count: usize) -> Result<(), CnetError> {
    if variable.data_type() == DataType::Bit {
        return Err(CnetError::DataType);
    }
    if count == 0 {
        return Err(CnetError::DataError);
    }
    if count * variable.data_type().size() > MAX_CONTINUOUS_BYTES {
        return Err(CnetError::DataSize);
    }
    Ok(())
}

impl CnetRequest {
    pub fn new(station: u8, body: CnetRequestBody) -> Self {
        Self {
            station,
            use_bcc: false,
            body,
        }
    }

    pub fn with_bcc(mut self, use_bcc: bool) -> Self {
        self.use_bcc = use_bcc;
        self
    }

    pub fn command(&self) -> CnetCommand {
        match &self.body {
            CnetRequestBody::Read(_) => CnetCommand::Read,
            CnetRequestBody::WriteIndividual(_) | CnetRequestBody::WriteContinuous { .. } => {
                CnetCommand::Write
            }
            CnetRequestBody::RegisterMonitor { .. } => CnetCommand::RegisterMonitor,
            CnetRequestBody::ExecuteMonitor { .. } => CnetCommand::ExecuteMonitor,
        }
    }

    pub fn command_type(&self) -> CnetCommandType {
        match &self.body {
            CnetRequestBody::Read(read) => read.command_type(),
            CnetRequestBody::WriteIndividual(_) => CnetCommandType::Individual,
            CnetRequestBody::WriteContinuous { .. } => CnetCommandType::Continuous,
            CnetRequestBody::RegisterMonitor { monitor, .. }
            | CnetRequestBody::ExecuteMonitor { monitor } => CnetCommandType::Monitor(*monitor),
        }
    }

    pub fn header(&self) -> CnetHeader {
        CnetHeader {
            station: self.station,
            use_bcc: self.use_bcc,
            command: self.command(),
            command_type: self.command_type(),
        }
    }

    /// Check block counts, name lengths and size limits
    pub fn validate(&self) -> Result<(), CnetError> {
        match &self.body {
            CnetRequestBody::Read(read) => read.validate(),
            CnetRequestBody::WriteIndividual(items) => {
                validate_blocks(items.iter().map(|(variable, _)| variable))
            }
            CnetRequestBody::WriteContinuous { variable, values } => {
                validate_continuous(variable, values.len())
            }
            CnetRequestBody::RegisterMonitor { monitor, read } => {
                if *monitor > MAX_MONITOR_NUMBER {
                    return Err(CnetError::MonitorNumberRange);
                }
                read.validate()
            }
            CnetRequestBody::ExecuteMonitor { monitor } => {
                if *monitor > MAX_MONITOR_NUMBER {
                    return Err(CnetError::MonitorNumberRange);
                }
                Ok(())
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![ENQ];
        self.header().push(&mut out);

        match &self.body {
            CnetRequestBody::Read(read) => read.push(&mut out),
            CnetRequestBody::WriteIndividual(items) => {
                push_hex_u8(&mut out, items.len() as u8);
                for (variable, value) in items {
                    push_variable(&mut out, variable);
                    let value = DeviceValue::from_raw(variable.data_type(), value.raw());
                    push_hex(&mut out, &value.to_be_bytes());
                }
            }
            CnetRequestBody::WriteContinuous { variable, values } => {
                push_variable(&mut out, variable);
                push_hex_u8(&mut out, values.len() as u8);
                for value in values {
                    let value = DeviceValue::from_raw(variable.data_type(), value.raw());
                    push_hex(&mut out, &value.to_be_bytes());
                }
            }
            CnetRequestBody::RegisterMonitor { read, .. } => {
                out.push(CnetCommand::Read.letter());
                read.command_type().push(&mut out);
                read.push(&mut out);
            }
            CnetRequestBody::ExecuteMonitor { .. } => {}
        }

        finish_frame(&mut out, EOT, self.use_bcc);
        out
    }

    /// Decode a complete request frame
    pub fn decode(frame: &[u8]) -> Result<Self, CnetError> {
        if frame.first() != Some(&ENQ) {
            return Err(CnetError::UnknownCommand);
        }
        let (body, use_bcc) = open_frame(frame, EOT)?;
        let mut reader = FieldReader::new(body);

        let station = reader.hex_u8()?;
        let letter = reader.take(1)?[0];
        let command = CnetCommand::from_letter(letter).ok_or(CnetError::UnknownCommand)?;
        let command_type = CnetCommandType::parse(command, reader.take(2)?)?;

        let body = match (command, command_type) {
            (CnetCommand::Read, command_type) => {
                CnetRequestBody::Read(CnetRead::parse(command_type, &mut reader)?)
            }
            (CnetCommand::Write, CnetCommandType::Individual) => {
                let blocks = reader.hex_u8()? as usize;
                let mut items = Vec::with_capacity(blocks.min(MAX_BLOCKS));
                for _ in 0..blocks.min(MAX_BLOCKS + 1) {
                    let variable = reader.variable()?;
                    let data = reader.hex_bytes(variable.data_type().size())?;
                    let value = DeviceValue::from_be_bytes(variable.data_type(), &data)
                        .map_err(|_| CnetError::DataValue)?;
                    items.push((variable, value));
                }
                validate_blocks(items.iter().map(|(variable, _)| variable))?;
                CnetRequestBody::WriteIndividual(items)
            }
            (CnetCommand::Write, _) => {
                let variable = reader.variable()?;
                let count = reader.hex_u8()? as usize;
                validate_continuous(&variable, count)?;
                let size = variable.data_type().size();
                let data = reader.hex_bytes(count * size)?;
                let values = data
                    .chunks_exact(size)
                    .map(|chunk| DeviceValue::from_be_bytes(variable.data_type(), chunk))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| CnetError::DataValue)?;
                CnetRequestBody::WriteContinuous { variable, values }
            }
            (CnetCommand::RegisterMonitor, CnetCommandType::Monitor(monitor)) => {
                let inner = reader.take(1)?[0];
                if inner.to_ascii_uppercase() != CnetCommand::Read.letter() {
                    return Err(CnetError::UnknownCommand);
                }
                let read_type = CnetCommandType::parse(CnetCommand::Read, reader.take(2)?)?;
                let read = CnetRead::parse(read_type, &mut reader)?;
                CnetRequestBody::RegisterMonitor { monitor, read }
            }
            (CnetCommand::ExecuteMonitor, CnetCommandType::Monitor(monitor)) => {
                CnetRequestBody::ExecuteMonitor { monitor }
            }
            _ => return Err(CnetError::UnknownCommand),
        };
        reader.finish()?;

        Ok(Self {
            station,
            use_bcc,
            body,
        })
    }

    /// Frame boundary of a request starting at `buf[0]`
    pub fn check(buf: &[u8]) -> Result<FrameCheck, CnetError> {
        check_frame(buf, &[ENQ], EOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> DeviceVariable {
        DeviceVariable::parse(name).unwrap()
    }

    #[test]
    fn test_encode_read_individual() {
        let request = CnetRequest::new(
            0x20,
            CnetRequestBody::Read(CnetRead::Individual(vec![var("%MW100"), var("%PW1")])),
        );
        let frame = request.encode();
        assert_eq!(frame, b"\x0520RSS0206%MW10004%PW1\x04".to_vec());
        assert_eq!(CnetRequest::decode(&frame).unwrap(), request);
        assert_eq!(CnetRequest::check(&frame).unwrap(), FrameCheck::Complete(frame.len()));
    }

    #[test]
    fn test_every_request_roundtrips() {
        let bodies = vec![
            CnetRequestBody::Read(CnetRead::Individual(vec![var("%MX10"), var("%PX0")])),
            CnetRequestBody::Read(CnetRead::Continuous { variable: var("%DW200"), count: 10 }),
            CnetRequestBody::WriteIndividual(vec![
                (var("%MW10"), DeviceValue::Word(0x00E2)),
                (var("%MW11"), DeviceValue::Word(0xFFFF)),
            ]),
            CnetRequestBody::WriteContinuous {
                variable: var("%MB4"),
                values: vec![DeviceValue::Byte(1), DeviceValue::Byte(2), DeviceValue::Byte(3)],
            },
            CnetRequestBody::RegisterMonitor {
                monitor: 0x00,
                read: CnetRead::Individual(vec![var("%MD0")]),
            },
            CnetRequestBody::ExecuteMonitor { monitor: 0x1F },
        ];
        for body in bodies {
            for use_bcc in [false, true] {
                let request = CnetRequest::new(0x1E, body.clone()).with_bcc(use_bcc);
                let frame = request.encode();
                assert_eq!(CnetRequest::check(&frame).unwrap(), FrameCheck::Complete(frame.len()));
                assert_eq!(CnetRequest::decode(&frame).unwrap(), request, "{:?}", request);
            }
        }
    }

    #[test]
    fn test_write_continuous_with_bcc() {
        let request = CnetRequest::new(
            0x01,
            CnetRequestBody::WriteContinuous {
                variable: var("%DW10"),
                values: vec![DeviceValue::Word(0x1234), DeviceValue::Word(0xABCD)],
            },
        )
        .with_bcc(true);
        let frame = request.encode();
        assert!(frame.starts_with(b"\x0501wSB05%DW1002"));
        assert_eq!(CnetRequest::check(&frame).unwrap(), FrameCheck::Complete(frame.len()));
        let eot = frame.iter().position(|b| *b == EOT).unwrap();
        assert_eq!(CnetRequest::check(&frame[..=eot]).unwrap(), FrameCheck::NeedMore(2));
        assert_eq!(CnetRequest::decode(&frame).unwrap(), request);
    }

    #[test]
    fn test_monitor_frames() {
        let register = CnetRequest::new(
            0x05,
            CnetRequestBody::RegisterMonitor {
                monitor: 0x1F,
                read: CnetRead::Continuous { variable: var("%MB0"), count: 4 },
            },
        );
        let frame = register.encode();
        assert_eq!(frame, b"\x0505X1FRSB04%MB004\x04".to_vec());
        assert_eq!(CnetRequest::decode(&frame).unwrap(), register);

        let execute = CnetRequest::new(0x05, CnetRequestBody::ExecuteMonitor { monitor: 3 });
        assert_eq!(execute.encode(), b"\x0505Y03\x04".to_vec());
        assert_eq!(
            CnetRequest::decode(b"\x0505Y20\x04"),
            Err(CnetError::MonitorNumberRange)
        );
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(CnetRequest::decode(b"\x0500QSS\x04"), Err(CnetError::UnknownCommand));
        assert_eq!(CnetRequest::decode(b"\x0500RSX\x04"), Err(CnetError::UnknownCommand));
        assert_eq!(
            CnetRequest::decode(b"\x0500RSS0106%MW100\x04FF"),
            Err(CnetError::ExtraFrame)
        );
        assert_eq!(
            CnetRequest::decode(b"\x0500rSS0106%MW100\x0400"),
            Err(CnetError::Bcc)
        );
        assert_eq!(
            CnetRequest::decode(b"\x0500RSS0211%MW1000000000000000\x04"),
            Err(CnetError::VariableLength)
        );
        assert_eq!(
            CnetRequest::decode(b"\x0500RSS0206%MW10006%MD100\x04"),
            Err(CnetError::DataTypeMismatch)
        );
        assert_eq!(
            CnetRequest::decode(b"\x0500RSB06%MW100F1\x04"),
            Err(CnetError::DataSize)
        );
        assert_eq!(
            CnetRequest::decode(b"\x0500RSB06%MX10001\x04"),
            Err(CnetError::DataType)
        );
        assert_eq!(
            CnetRequest::decode(b"\x0500WSS0106%MW100ZZZZ\x04"),
            Err(CnetError::DataValue)
        );
    }

    #[test]
    fn test_block_count_limit() {
        let variables = (0..17).map(|i| var(&format!("%MW{}", i))).collect();
        let request = CnetRequest::new(0, CnetRequestBody::Read(CnetRead::Individual(variables)));
        assert_eq!(request.validate(), Err(CnetError::BlockCountExceeded));
        assert_eq!(
            CnetRequest::decode(&request.encode()),
            Err(CnetError::BlockCountExceeded)
        );
    }

    #[test]
    fn test_check_frame() {
        assert_eq!(CnetRequest::check(b"\x06").unwrap(), FrameCheck::BadHeader);
        assert_eq!(CnetRequest::check(b"\x0520RSS").unwrap(), FrameCheck::NeedMore(1));
        assert!(CnetRequest::check(&[ENQ; super::super::MAX_FRAME_LEN]).is_err());
    }
}
