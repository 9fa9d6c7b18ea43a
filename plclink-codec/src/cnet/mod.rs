//! LS XGT Cnet codec
//!
//! Cnet is a text protocol: every numeric field is upper-case hex ASCII and
//! device data travels big-endian per item. A lower-case command letter
//! means the frame carries a two-digit BCC after its terminator.

pub mod request;
pub mod response;

use crate::checksum::sum8;
use crate::hex::{decode_hex, hex_u8, hex_u16, push_hex_u8};
use plclink_core::datatypes::{DataType, DeviceVariable, MAX_VARIABLE_NAME_LENGTH};
use plclink_core::nak::CnetError;

pub use request::{CnetRead, CnetRequest, CnetRequestBody};
pub use response::{CnetResponse, CnetResponsePayload};

pub const ENQ: u8 = 0x05;
pub const EOT: u8 = 0x04;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const ETX: u8 = 0x03;

/// Individual requests address at most this many variables
pub const MAX_BLOCKS: usize = 16;
/// Largest continuous read/write in bytes
pub const MAX_CONTINUOUS_BYTES: usize = 240;
/// Monitor numbers run from 0x00 to this value
pub const MAX_MONITOR_NUMBER: u8 = 0x1F;
/// Longest frame accepted before giving up on a terminator
pub const MAX_FRAME_LEN: usize = 1024;

/// Command letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CnetCommand {
    Read,
    Write,
    RegisterMonitor,
    ExecuteMonitor,
}

impl CnetCommand {
    pub fn letter(self) -> u8 {
        match self {
            CnetCommand::Read => b'R',
            CnetCommand::Write => b'W',
            CnetCommand::RegisterMonitor => b'X',
            CnetCommand::ExecuteMonitor => b'Y',
        }
    }

    /// Case-insensitive; the case itself selects BCC mode
    pub fn from_letter(letter: u8) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            b'R' => Some(CnetCommand::Read),
            b'W' => Some(CnetCommand::Write),
            b'X' => Some(CnetCommand::RegisterMonitor),
            b'Y' => Some(CnetCommand::ExecuteMonitor),
            _ => None,
        }
    }

    fn wire_letter(self, use_bcc: bool) -> u8 {
        if use_bcc {
            self.letter().to_ascii_lowercase()
        } else {
            self.letter()
        }
    }
}

/// The two characters following the command letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CnetCommandType {
    /// `SS`
    Individual,
    /// `SB`
    Continuous,
    /// Monitor number, for `X`/`Y`
    Monitor(u8),
}

impl CnetCommandType {
    fn push(self, out: &mut Vec<u8>) {
        match self {
            CnetCommandType::Individual => out.extend_from_slice(b"SS"),
            CnetCommandType::Continuous => out.extend_from_slice(b"SB"),
            CnetCommandType::Monitor(number) => push_hex_u8(out, number),
        }
    }

    fn parse(command: CnetCommand, field: &[u8]) -> Result<Self, CnetError> {
        match command {
            CnetCommand::Read | CnetCommand::Write => match field {
                b"SS" => Ok(CnetCommandType::Individual),
                b"SB" => Ok(CnetCommandType::Continuous),
                _ => Err(CnetError::UnknownCommand),
            },
            CnetCommand::RegisterMonitor | CnetCommand::ExecuteMonitor => {
                let number = hex_u8(field).ok_or(CnetError::DataValue)?;
                if number > MAX_MONITOR_NUMBER {
                    return Err(CnetError::MonitorNumberRange);
                }
                Ok(CnetCommandType::Monitor(number))
            }
        }
    }
}

/// Fields every frame starts with, for building a NAK from a partial frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CnetHeader {
    pub station: u8,
    pub use_bcc: bool,
    pub command: CnetCommand,
    pub command_type: CnetCommandType,
}

impl CnetHeader {
    /// Parse as much of a header as possible from a frame prefix
    ///
    /// Returns `None` when station or command letter are unreadable. An
    /// unreadable type field falls back to [`CnetCommandType::Individual`].
    pub fn peek(frame: &[u8]) -> Option<Self> {
        let station = hex_u8(frame.get(1..3)?)?;
        let letter = *frame.get(3)?;
        let command = CnetCommand::from_letter(letter)?;
        let command_type = frame
            .get(4..6)
            .and_then(|field| CnetCommandType::parse(command, field).ok())
            .unwrap_or(CnetCommandType::Individual);
        Some(Self {
            station,
            use_bcc: letter.is_ascii_lowercase(),
            command,
            command_type,
        })
    }

    fn push(&self, out: &mut Vec<u8>) {
        push_hex_u8(out, self.station);
        out.push(self.command.wire_letter(self.use_bcc));
        self.command_type.push(out);
    }
}

/// Sequential reader over the ASCII body of a frame
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], CnetError> {
        let end = self.pos.checked_add(n).ok_or(CnetError::DataError)?;
        let field = self.buf.get(self.pos..end).ok_or(CnetError::DataError)?;
        self.pos = end;
        Ok(field)
    }

    pub(crate) fn hex_u8(&mut self) -> Result<u8, CnetError> {
        hex_u8(self.take(2)?).ok_or(CnetError::DataValue)
    }

    pub(crate) fn hex_u16(&mut self) -> Result<u16, CnetError> {
        hex_u16(self.take(4)?).ok_or(CnetError::DataValue)
    }

    pub(crate) fn hex_bytes(&mut self, count: usize) -> Result<Vec<u8>, CnetError> {
        decode_hex(self.take(count * 2)?).ok_or(CnetError::DataValue)
    }

    /// Length-prefixed variable name
    pub(crate) fn variable(&mut self) -> Result<DeviceVariable, CnetError> {
        let len = self.hex_u8()? as usize;
        if len > MAX_VARIABLE_NAME_LENGTH {
            return Err(CnetError::VariableLength);
        }
        parse_variable(self.take(len)?)
    }

    pub(crate) fn finish(&self) -> Result<(), CnetError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(CnetError::ExtraFrame)
        }
    }
}

fn parse_variable(name: &[u8]) -> Result<DeviceVariable, CnetError> {
    let text = std::str::from_utf8(name).map_err(|_| CnetError::DeviceMemory)?;
    if let (Some('%'), Some(letter)) = (text.chars().next(), text.chars().nth(2)) {
        if DataType::from_letter(letter.to_ascii_uppercase()).is_none() {
            return Err(CnetError::DataType);
        }
    }
    DeviceVariable::parse(text).map_err(|_| CnetError::DeviceMemory)
}

pub(crate) fn push_variable(out: &mut Vec<u8>, variable: &DeviceVariable) {
    let name = variable.to_string();
    push_hex_u8(out, name.len() as u8);
    out.extend_from_slice(name.as_bytes());
}

/// Terminate a frame and append the BCC when requested
pub(crate) fn finish_frame(out: &mut Vec<u8>, terminator: u8, use_bcc: bool) {
    out.push(terminator);
    if use_bcc {
        let bcc = sum8(out);
        push_hex_u8(out, bcc);
    }
}

/// Split a complete frame at its terminator and verify the BCC
///
/// Returns the bytes between the leading control byte and the terminator.
pub(crate) fn open_frame(frame: &[u8], terminator: u8) -> Result<(&[u8], bool), CnetError> {
    let end = frame
        .iter()
        .position(|b| *b == terminator)
        .ok_or(CnetError::DataError)?;
    let use_bcc = frame.get(3).is_some_and(|b| b.is_ascii_lowercase());
    let trailer = &frame[end + 1..];
    if use_bcc {
        let expected = hex_u8(trailer).ok_or(CnetError::Bcc)?;
        if sum8(&frame[..=end]) != expected {
            return Err(CnetError::Bcc);
        }
    } else if !trailer.is_empty() {
        return Err(CnetError::ExtraFrame);
    }
    Ok((&frame[1..end], use_bcc))
}

/// Frame boundary shared by requests and responses
pub(crate) fn check_frame(
    buf: &[u8],
    starts: &[u8],
    terminator: u8,
) -> Result<crate::framing::FrameCheck, CnetError> {
    use crate::framing::FrameCheck;

    match buf.first() {
        None => return Ok(FrameCheck::NeedMore(1)),
        Some(b) if starts.contains(b) => {}
        Some(_) => return Ok(FrameCheck::BadHeader),
    }
    match buf.iter().position(|b| *b == terminator) {
        Some(end) => {
            let use_bcc = buf.get(3).is_some_and(|b| b.is_ascii_lowercase());
            let total = end + 1 + if use_bcc { 2 } else { 0 };
            if buf.len() >= total {
                Ok(FrameCheck::Complete(total))
            } else {
                Ok(FrameCheck::NeedMore(total - buf.len()))
            }
        }
        None if buf.len() >= MAX_FRAME_LEN => Err(CnetError::FrameTooLong),
        None => Ok(FrameCheck::NeedMore(1)),
    }
}
