//! Modbus PDU (function code + data) encoding and decoding

use crate::framing::FrameCheck;
use crate::modbus::values;
use plclink_core::nak::{ModbusException, ModbusFrameError, NakCode};

/// Maximum PDU size (256-byte serial ADU minus address and CRC)
pub const MAX_PDU_SIZE: usize = 253;
/// FC01/FC02 quantity limit
pub const MAX_READ_BITS: u16 = 2000;
/// FC15 quantity limit
pub const MAX_WRITE_BITS: u16 = 1968;
/// FC03/FC04 quantity limit
pub const MAX_READ_REGISTERS: u16 = 125;
/// FC16 quantity limit
pub const MAX_WRITE_REGISTERS: u16 = 123;

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;
const EXCEPTION_FLAG: u8 = 0x80;

/// Supported function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
}

impl FunctionCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => FunctionCode::ReadCoils,
            0x02 => FunctionCode::ReadDiscreteInputs,
            0x03 => FunctionCode::ReadHoldingRegisters,
            0x04 => FunctionCode::ReadInputRegisters,
            0x05 => FunctionCode::WriteSingleCoil,
            0x06 => FunctionCode::WriteSingleRegister,
            0x0F => FunctionCode::WriteMultipleCoils,
            0x10 => FunctionCode::WriteMultipleRegisters,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            FunctionCode::ReadCoils => 0x01,
            FunctionCode::ReadDiscreteInputs => 0x02,
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::ReadInputRegisters => 0x04,
            FunctionCode::WriteSingleCoil => 0x05,
            FunctionCode::WriteSingleRegister => 0x06,
            FunctionCode::WriteMultipleCoils => 0x0F,
            FunctionCode::WriteMultipleRegisters => 0x10,
        }
    }
}

/// A decoded Modbus request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, values: Vec<bool> },
    WriteMultipleRegisters { address: u16, values: Vec<u16> },
}

impl ModbusRequest {
    pub fn function(&self) -> FunctionCode {
        match self {
            ModbusRequest::ReadCoils { .. } => FunctionCode::ReadCoils,
            ModbusRequest::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            ModbusRequest::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            ModbusRequest::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            ModbusRequest::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            ModbusRequest::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            ModbusRequest::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            ModbusRequest::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    /// Check quantity limits and address range before sending
    pub fn validate(&self) -> Result<(), ModbusException> {
        let (address, quantity, limit) = match self {
            ModbusRequest::ReadCoils { address, quantity }
            | ModbusRequest::ReadDiscreteInputs { address, quantity } => {
                (*address, *quantity, MAX_READ_BITS)
            }
            ModbusRequest::ReadHoldingRegisters { address, quantity }
            | ModbusRequest::ReadInputRegisters { address, quantity } => {
                (*address, *quantity, MAX_READ_REGISTERS)
            }
            ModbusRequest::WriteSingleCoil { .. } | ModbusRequest::WriteSingleRegister { .. } => {
                return Ok(());
            }
            ModbusRequest::WriteMultipleCoils { address, values } => {
                (*address, values.len().min(u16::MAX as usize) as u16, MAX_WRITE_BITS)
            }
            ModbusRequest::WriteMultipleRegisters { address, values } => {
                (*address, values.len().min(u16::MAX as usize) as u16, MAX_WRITE_REGISTERS)
            }
        };
        if quantity == 0 || quantity > limit {
            return Err(ModbusException::IllegalDataValue);
        }
        if address as u32 + quantity as u32 > 0x1_0000 {
            return Err(ModbusException::IllegalDataAddress);
        }
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut pdu = vec![self.function().code()];
        match self {
            ModbusRequest::ReadCoils { address, quantity }
            | ModbusRequest::ReadDiscreteInputs { address, quantity }
            | ModbusRequest::ReadHoldingRegisters { address, quantity }
            | ModbusRequest::ReadInputRegisters { address, quantity } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&quantity.to_be_bytes());
            }
            ModbusRequest::WriteSingleCoil { address, value } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                let raw = if *value { COIL_ON } else { COIL_OFF };
                pdu.extend_from_slice(&raw.to_be_bytes());
            }
            ModbusRequest::WriteSingleRegister { address, value } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&value.to_be_bytes());
            }
            ModbusRequest::WriteMultipleCoils { address, values } => {
                let packed = values::pack_bits(values);
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
                pdu.push(packed.len() as u8);
                pdu.extend_from_slice(&packed);
            }
            ModbusRequest::WriteMultipleRegisters { address, values } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
                pdu.push((values.len() * 2) as u8);
                for v in values {
                    pdu.extend_from_slice(&v.to_be_bytes());
                }
            }
        }
        pdu
    }

    /// Decode a request PDU, mapping every failure to the exception a slave replies with
    pub fn decode(pdu: &[u8]) -> Result<Self, ModbusException> {
        let (&code, data) = pdu.split_first().ok_or(ModbusException::IllegalFunction)?;
        let function = FunctionCode::from_u8(code).ok_or(ModbusException::IllegalFunction)?;
        if data.len() < 4 {
            return Err(ModbusException::IllegalDataValue);
        }
        let address = u16::from_be_bytes([data[0], data[1]]);
        let word = u16::from_be_bytes([data[2], data[3]]);

        let request = match function {
            FunctionCode::ReadCoils
            | FunctionCode::ReadDiscreteInputs
            | FunctionCode::ReadHoldingRegisters
            | FunctionCode::ReadInputRegisters => {
                if data.len() != 4 {
                    return Err(ModbusException::IllegalDataValue);
                }
                match function {
                    FunctionCode::ReadCoils => ModbusRequest::ReadCoils { address, quantity: word },
                    FunctionCode::ReadDiscreteInputs => {
                        ModbusRequest::ReadDiscreteInputs { address, quantity: word }
                    }
                    FunctionCode::ReadHoldingRegisters => {
                        ModbusRequest::ReadHoldingRegisters { address, quantity: word }
                    }
                    _ => ModbusRequest::ReadInputRegisters { address, quantity: word },
                }
            }
            FunctionCode::WriteSingleCoil => {
                let value = match word {
                    COIL_ON => true,
                    COIL_OFF => false,
                    _ => return Err(ModbusException::IllegalDataValue),
                };
                ModbusRequest::WriteSingleCoil { address, value }
            }
            FunctionCode::WriteSingleRegister => {
                ModbusRequest::WriteSingleRegister { address, value: word }
            }
            FunctionCode::WriteMultipleCoils => {
                let bytes = multiple_write_payload(data, (word as usize).div_ceil(8))?;
                ModbusRequest::WriteMultipleCoils {
                    address,
                    values: values::unpack_bits(bytes, word as usize),
                }
            }
            FunctionCode::WriteMultipleRegisters => {
                let bytes = multiple_write_payload(data, word as usize * 2)?;
                ModbusRequest::WriteMultipleRegisters {
                    address,
                    values: bytes
                        .chunks_exact(2)
                        .map(|c| u16::from_be_bytes([c[0], c[1]]))
                        .collect(),
                }
            }
        };
        request.validate()?;
        Ok(request)
    }
}

/// Data bytes of an FC15/FC16 request after the byte-count field
fn multiple_write_payload(data: &[u8], expected: usize) -> Result<&[u8], ModbusException> {
    let byte_count = *data.get(4).ok_or(ModbusException::IllegalDataValue)? as usize;
    if byte_count != expected || data.len() != 5 + byte_count {
        return Err(ModbusException::IllegalDataValue);
    }
    Ok(&data[5..])
}

/// A decoded Modbus response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    /// FC01/FC02; padded to a multiple of 8 bits
    ReadBits { function: FunctionCode, values: Vec<bool> },
    /// FC03/FC04
    ReadRegisters { function: FunctionCode, values: Vec<u16> },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    /// FC15/FC16 echo of address and quantity
    WriteMultiple { function: FunctionCode, address: u16, quantity: u16 },
    /// `function` is the request function code without the 0x80 flag
    Exception { function: u8, exception: ModbusException },
}

impl ModbusResponse {
    pub fn exception(function: u8, exception: ModbusException) -> Self {
        ModbusResponse::Exception { function: function & !EXCEPTION_FLAG, exception }
    }

    /// Function code byte as it appears on the wire
    pub fn function_code(&self) -> u8 {
        match self {
            ModbusResponse::ReadBits { function, .. }
            | ModbusResponse::ReadRegisters { function, .. }
            | ModbusResponse::WriteMultiple { function, .. } => function.code(),
            ModbusResponse::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil.code(),
            ModbusResponse::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister.code(),
            ModbusResponse::Exception { function, .. } => function | EXCEPTION_FLAG,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, ModbusResponse::Exception { .. })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut pdu = vec![self.function_code()];
        match self {
            ModbusResponse::ReadBits { values, .. } => {
                let packed = values::pack_bits(values);
                pdu.push(packed.len() as u8);
                pdu.extend_from_slice(&packed);
            }
            ModbusResponse::ReadRegisters { values, .. } => {
                pdu.push((values.len() * 2) as u8);
                for v in values {
                    pdu.extend_from_slice(&v.to_be_bytes());
                }
            }
            ModbusResponse::WriteSingleCoil { address, value } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                let raw = if *value { COIL_ON } else { COIL_OFF };
                pdu.extend_from_slice(&raw.to_be_bytes());
            }
            ModbusResponse::WriteSingleRegister { address, value } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&value.to_be_bytes());
            }
            ModbusResponse::WriteMultiple { address, quantity, .. } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&quantity.to_be_bytes());
            }
            ModbusResponse::Exception { exception, .. } => pdu.push(exception.code()),
        }
        pdu
    }

    pub fn decode(pdu: &[u8]) -> Result<Self, NakCode> {
        let length_error = || NakCode::from(ModbusFrameError::Length);
        let (&code, data) = pdu.split_first().ok_or_else(length_error)?;

        if code & EXCEPTION_FLAG != 0 {
            let &[exception] = data else {
                return Err(length_error());
            };
            return Ok(ModbusResponse::exception(code, ModbusException::from_code(exception)));
        }

        let function = FunctionCode::from_u8(code)
            .ok_or_else(|| NakCode::from(ModbusFrameError::UnexpectedFunction))?;
        match function {
            FunctionCode::ReadCoils
            | FunctionCode::ReadDiscreteInputs
            | FunctionCode::ReadHoldingRegisters
            | FunctionCode::ReadInputRegisters => {
                let (&byte_count, payload) = data.split_first().ok_or_else(length_error)?;
                if payload.len() != byte_count as usize {
                    return Err(length_error());
                }
                if matches!(
                    function,
                    FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs
                ) {
                    Ok(ModbusResponse::ReadBits {
                        function,
                        values: values::unpack_bits(payload, payload.len() * 8),
                    })
                } else {
                    if payload.len() % 2 != 0 {
                        return Err(length_error());
                    }
                    Ok(ModbusResponse::ReadRegisters {
                        function,
                        values: payload
                            .chunks_exact(2)
                            .map(|c| u16::from_be_bytes([c[0], c[1]]))
                            .collect(),
                    })
                }
            }
            _ => {
                let &[a0, a1, v0, v1] = data else {
                    return Err(length_error());
                };
                let address = u16::from_be_bytes([a0, a1]);
                let word = u16::from_be_bytes([v0, v1]);
                Ok(match function {
                    FunctionCode::WriteSingleCoil => ModbusResponse::WriteSingleCoil {
                        address,
                        value: word == COIL_ON,
                    },
                    FunctionCode::WriteSingleRegister => {
                        ModbusResponse::WriteSingleRegister { address, value: word }
                    }
                    _ => ModbusResponse::WriteMultiple { function, address, quantity: word },
                })
            }
        }
    }

    /// Bit values of an FC01/FC02 response
    pub fn bits(&self) -> Option<&[bool]> {
        match self {
            ModbusResponse::ReadBits { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Register values of an FC03/FC04 response
    pub fn registers(&self) -> Option<&[u16]> {
        match self {
            ModbusResponse::ReadRegisters { values, .. } => Some(values),
            _ => None,
        }
    }

    pub fn as_i16s(&self) -> Option<Vec<i16>> {
        self.registers().map(|r| r.iter().map(|v| *v as i16).collect())
    }

    /// Register pairs as u32, high word first
    pub fn as_u32s(&self) -> Option<Vec<u32>> {
        self.registers().map(values::registers_to_u32s)
    }

    pub fn as_i32s(&self) -> Option<Vec<i32>> {
        self.as_u32s().map(|v| v.into_iter().map(|x| x as i32).collect())
    }

    /// Register pairs as IEEE 754 single precision, high word first
    pub fn as_f32s(&self) -> Option<Vec<f32>> {
        self.as_u32s().map(|v| v.into_iter().map(f32::from_bits).collect())
    }

    /// Register quads as IEEE 754 double precision, high word first
    pub fn as_f64s(&self) -> Option<Vec<f64>> {
        self.registers().map(values::registers_to_f64s)
    }
}

/// Length of the request PDU starting at `pdu[0]`
pub fn request_pdu_len(pdu: &[u8]) -> Result<FrameCheck, NakCode> {
    let Some(&code) = pdu.first() else {
        return Ok(FrameCheck::NeedMore(1));
    };
    match code {
        0x01..=0x06 => Ok(FrameCheck::Complete(5)),
        0x0F | 0x10 => match pdu.get(5) {
            Some(&byte_count) => Ok(FrameCheck::Complete(6 + byte_count as usize)),
            None => Ok(FrameCheck::NeedMore(6 - pdu.len())),
        },
        _ => Err(ModbusException::IllegalFunction.into()),
    }
}

/// Length of the response PDU starting at `pdu[0]`
pub fn response_pdu_len(pdu: &[u8]) -> Result<FrameCheck, NakCode> {
    let Some(&code) = pdu.first() else {
        return Ok(FrameCheck::NeedMore(1));
    };
    if code & EXCEPTION_FLAG != 0 {
        return Ok(FrameCheck::Complete(2));
    }
    match code {
        0x01..=0x04 => match pdu.get(1) {
            Some(&byte_count) => Ok(FrameCheck::Complete(2 + byte_count as usize)),
            None => Ok(FrameCheck::NeedMore(1)),
        },
        0x05 | 0x06 | 0x0F | 0x10 => Ok(FrameCheck::Complete(5)),
        _ => Err(ModbusFrameError::UnexpectedFunction.into()),
    }
}
