//! Protocol NAK / exception codes
//!
//! Every decode failure and every negative response maps to exactly one
//! enumerated code. Descriptions live in static tables and are only looked up
//! when a code is displayed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Modbus exception codes (function code | 0x80 responses)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModbusException {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    NegativeAcknowledge,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailed,
    Other(u8),
}

const MODBUS_EXCEPTIONS: &[(ModbusException, u8, &str)] = &[
    (ModbusException::IllegalFunction, 0x01, "illegal function"),
    (ModbusException::IllegalDataAddress, 0x02, "illegal data address"),
    (ModbusException::IllegalDataValue, 0x03, "illegal data value"),
    (ModbusException::ServerDeviceFailure, 0x04, "server device failure"),
    (ModbusException::Acknowledge, 0x05, "acknowledge"),
    (ModbusException::ServerDeviceBusy, 0x06, "server device busy"),
    (ModbusException::NegativeAcknowledge, 0x07, "negative acknowledge"),
    (ModbusException::MemoryParityError, 0x08, "memory parity error"),
    (ModbusException::GatewayPathUnavailable, 0x0A, "gateway path unavailable"),
    (ModbusException::GatewayTargetFailed, 0x0B, "gateway target device failed to respond"),
];

impl ModbusException {
    pub fn from_code(code: u8) -> Self {
        MODBUS_EXCEPTIONS
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(e, _, _)| *e)
            .unwrap_or(ModbusException::Other(code))
    }

    pub fn code(self) -> u8 {
        match self {
            ModbusException::Other(code) => code,
            known => MODBUS_EXCEPTIONS
                .iter()
                .find(|(e, _, _)| *e == known)
                .map(|(_, c, _)| *c)
                .unwrap_or(0),
        }
    }

    pub fn description(self) -> &'static str {
        MODBUS_EXCEPTIONS
            .iter()
            .find(|(e, _, _)| *e == self)
            .map(|(_, _, d)| *d)
            .unwrap_or("unknown exception code")
    }
}

/// Local-only Modbus framing failures.
///
/// Modbus has no wire code for a bad CRC or a truncated frame, so these are
/// never sent to a peer; a slave stays silent on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModbusFrameError {
    Checksum,
    Length,
    Header,
    UnexpectedFunction,
}

impl ModbusFrameError {
    pub fn description(self) -> &'static str {
        match self {
            ModbusFrameError::Checksum => "CRC/LRC mismatch",
            ModbusFrameError::Length => "frame length out of range",
            ModbusFrameError::Header => "malformed frame header",
            ModbusFrameError::UnexpectedFunction => "response function code does not match request",
        }
    }
}

/// LS XGT Cnet NAK codes (4 hex digits on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CnetError {
    BlockCountExceeded,
    VariableLength,
    DataType,
    DataError,
    MonitorNotRegistered,
    MonitorNumberRange,
    MonitorRegisterRange,
    DeviceMemory,
    DataSize,
    ExtraFrame,
    DataTypeMismatch,
    DataValue,
    AreaExceeded,
    Bcc,
    UnknownCommand,
    FrameTooLong,
    Other(u16),
}

const CNET_ERRORS: &[(CnetError, u16, &str)] = &[
    (CnetError::BlockCountExceeded, 0x0003, "number of blocks exceeds 16"),
    (CnetError::VariableLength, 0x0004, "variable name length exceeds 16"),
    (CnetError::DataType, 0x0007, "data type is not one of X, B, W, D, L"),
    (CnetError::DataError, 0x0011, "data error"),
    (CnetError::MonitorNotRegistered, 0x0090, "monitor number is not registered"),
    (CnetError::MonitorNumberRange, 0x0190, "monitor number out of range"),
    (CnetError::MonitorRegisterRange, 0x0290, "monitor registration out of range"),
    (CnetError::DeviceMemory, 0x1132, "unsupported device memory"),
    (CnetError::DataSize, 0x1232, "data size exceeds request limit"),
    (CnetError::ExtraFrame, 0x1234, "unexpected data after frame body"),
    (CnetError::DataTypeMismatch, 0x1332, "blocks of one request must share a data type"),
    (CnetError::DataValue, 0x1432, "data value is not valid hex"),
    (CnetError::AreaExceeded, 0x7132, "request exceeds device area"),
    (CnetError::Bcc, 0x7F01, "BCC mismatch"),
    (CnetError::UnknownCommand, 0x7F02, "unknown command or command type"),
    (CnetError::FrameTooLong, 0x7F03, "frame exceeds maximum length"),
];

impl CnetError {
    pub fn from_code(code: u16) -> Self {
        CNET_ERRORS
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(e, _, _)| *e)
            .unwrap_or(CnetError::Other(code))
    }

    pub fn code(self) -> u16 {
        match self {
            CnetError::Other(code) => code,
            known => CNET_ERRORS
                .iter()
                .find(|(e, _, _)| *e == known)
                .map(|(_, c, _)| *c)
                .unwrap_or(0),
        }
    }

    pub fn description(self) -> &'static str {
        CNET_ERRORS
            .iter()
            .find(|(e, _, _)| *e == self)
            .map(|(_, _, d)| *d)
            .unwrap_or("unknown error code")
    }
}

/// LS XGT FEnet error codes (little-endian u16 after a non-zero error status)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FenetError {
    BlockCountExceeded,
    DataType,
    Device,
    AreaExceeded,
    DataSize,
    TotalSize,
    Header,
    VariableName,
    Command,
    Checksum,
    Length,
    Other(u16),
}

const FENET_ERRORS: &[(FenetError, u16, &str)] = &[
    (FenetError::BlockCountExceeded, 0x0001, "individual request exceeds 16 blocks"),
    (FenetError::DataType, 0x0002, "unknown data type"),
    (FenetError::Device, 0x0003, "unsupported device"),
    (FenetError::AreaExceeded, 0x0004, "device area exceeded"),
    (FenetError::DataSize, 0x0005, "data size exceeds 1400 bytes"),
    (FenetError::TotalSize, 0x0006, "total block size exceeds 1400 bytes"),
    (FenetError::Header, 0x0075, "abnormal frame header"),
    (FenetError::VariableName, 0x0076, "abnormal variable name"),
    (FenetError::Command, 0x0078, "unknown command"),
    (FenetError::Checksum, 0x0079, "header checksum mismatch"),
    (FenetError::Length, 0x007A, "length field out of range"),
];

impl FenetError {
    pub fn from_code(code: u16) -> Self {
        FENET_ERRORS
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(e, _, _)| *e)
            .unwrap_or(FenetError::Other(code))
    }

    pub fn code(self) -> u16 {
        match self {
            FenetError::Other(code) => code,
            known => FENET_ERRORS
                .iter()
                .find(|(e, _, _)| *e == known)
                .map(|(_, c, _)| *c)
                .unwrap_or(0),
        }
    }

    pub fn description(self) -> &'static str {
        FENET_ERRORS
            .iter()
            .find(|(e, _, _)| *e == self)
            .map(|(_, _, d)| *d)
            .unwrap_or("unknown error code")
    }
}

/// A protocol-specific NAK code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NakCode {
    Modbus(ModbusException),
    ModbusFrame(ModbusFrameError),
    Cnet(CnetError),
    Fenet(FenetError),
}

impl NakCode {
    pub fn description(&self) -> &'static str {
        match self {
            NakCode::Modbus(e) => e.description(),
            NakCode::ModbusFrame(e) => e.description(),
            NakCode::Cnet(e) => e.description(),
            NakCode::Fenet(e) => e.description(),
        }
    }
}

impl fmt::Display for NakCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NakCode::Modbus(e) => write!(f, "Modbus 0x{:02X} ({})", e.code(), e.description()),
            NakCode::ModbusFrame(e) => write!(f, "Modbus frame ({})", e.description()),
            NakCode::Cnet(e) => write!(f, "Cnet 0x{:04X} ({})", e.code(), e.description()),
            NakCode::Fenet(e) => write!(f, "FEnet 0x{:04X} ({})", e.code(), e.description()),
        }
    }
}

impl From<ModbusException> for NakCode {
    fn from(e: ModbusException) -> Self {
        NakCode::Modbus(e)
    }
}

impl From<ModbusFrameError> for NakCode {
    fn from(e: ModbusFrameError) -> Self {
        NakCode::ModbusFrame(e)
    }
}

impl From<CnetError> for NakCode {
    fn from(e: CnetError) -> Self {
        NakCode::Cnet(e)
    }
}

impl From<FenetError> for NakCode {
    fn from(e: FenetError) -> Self {
        NakCode::Fenet(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modbus_code_lookup() {
        assert_eq!(ModbusException::from_code(0x02), ModbusException::IllegalDataAddress);
        assert_eq!(ModbusException::IllegalDataAddress.code(), 0x02);
        assert_eq!(ModbusException::from_code(0x42), ModbusException::Other(0x42));
        assert_eq!(ModbusException::Other(0x42).code(), 0x42);
        assert_eq!(
            ModbusException::IllegalDataAddress.description(),
            "illegal data address"
        );
    }

    #[test]
    fn test_cnet_code_lookup() {
        assert_eq!(CnetError::from_code(0x0003), CnetError::BlockCountExceeded);
        assert_eq!(CnetError::MonitorNotRegistered.code(), 0x0090);
        assert_eq!(CnetError::from_code(0x1234), CnetError::ExtraFrame);
    }

    #[test]
    fn test_fenet_code_lookup() {
        assert_eq!(FenetError::from_code(0x0079), FenetError::Checksum);
        assert_eq!(FenetError::from_code(0xBEEF), FenetError::Other(0xBEEF));
        assert_eq!(FenetError::Other(0xBEEF).description(), "unknown error code");
    }

    #[test]
    fn test_display() {
        let code = NakCode::from(FenetError::Checksum);
        assert_eq!(code.to_string(), "FEnet 0x0079 (header checksum mismatch)");
    }
}
