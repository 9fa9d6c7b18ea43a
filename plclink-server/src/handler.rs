//! Slave-side request notifications
//!
//! A slave decodes a request, fills a context object and hands it to the
//! application's handler. Read contexts carry the value slots the handler
//! fills in; any context can be failed with a NAK code, which turns the
//! reply into an error response.

use plclink_core::datatypes::{DataType, DeviceValue, DeviceVariable};
use plclink_core::nak::{CnetError, FenetError, ModbusException};

/// Modbus data table addressed by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusTable {
    Coils,
    DiscreteInputs,
    HoldingRegisters,
    InputRegisters,
}

impl ModbusTable {
    pub fn is_bits(self) -> bool {
        matches!(self, ModbusTable::Coils | ModbusTable::DiscreteInputs)
    }
}

/// Read-requested notification for Modbus FC01-FC04
#[derive(Debug, Clone, PartialEq)]
pub struct ModbusReadContext {
    pub unit_id: u8,
    pub table: ModbusTable,
    pub address: u16,
    pub quantity: u16,
    /// Filled for coil and discrete input reads
    pub bits: Vec<bool>,
    /// Filled for register reads
    pub registers: Vec<u16>,
    nak: Option<ModbusException>,
}

impl ModbusReadContext {
    pub fn new(unit_id: u8, table: ModbusTable, address: u16, quantity: u16) -> Self {
        Self {
            unit_id,
            table,
            address,
            quantity,
            bits: Vec::new(),
            registers: Vec::new(),
            nak: None,
        }
    }

    pub fn set_nak(&mut self, code: ModbusException) {
        self.nak = Some(code);
    }

    pub fn nak(&self) -> Option<ModbusException> {
        self.nak
    }
}

/// Write-requested notification for Modbus FC05, FC06, FC15 and FC16
#[derive(Debug, Clone, PartialEq)]
pub struct ModbusWriteContext {
    pub unit_id: u8,
    pub table: ModbusTable,
    pub address: u16,
    /// Coil values, for coil writes
    pub bits: Vec<bool>,
    /// Register values, for register writes
    pub registers: Vec<u16>,
    nak: Option<ModbusException>,
}

impl ModbusWriteContext {
    pub fn coils(unit_id: u8, address: u16, bits: Vec<bool>) -> Self {
        Self {
            unit_id,
            table: ModbusTable::Coils,
            address,
            bits,
            registers: Vec::new(),
            nak: None,
        }
    }

    pub fn registers(unit_id: u8, address: u16, registers: Vec<u16>) -> Self {
        Self {
            unit_id,
            table: ModbusTable::HoldingRegisters,
            address,
            bits: Vec::new(),
            registers,
            nak: None,
        }
    }

    pub fn set_nak(&mut self, code: ModbusException) {
        self.nak = Some(code);
    }

    pub fn nak(&self) -> Option<ModbusException> {
        self.nak
    }
}

/// Application side of a Modbus slave
#[cfg_attr(test, mockall::automock)]
pub trait ModbusRequestHandler: Send + Sync {
    fn on_read(&self, context: &mut ModbusReadContext);
    fn on_write(&self, context: &mut ModbusWriteContext);
}

/// Device access failure, mapped to each protocol's NAK code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFault {
    /// The device letter is not backed by memory
    UnsupportedDevice,
    /// The access runs past the end of the device
    AreaExceeded,
    /// The value does not fit the variable's type
    DataType,
}

impl DeviceFault {
    pub fn cnet_code(self) -> CnetError {
        match self {
            DeviceFault::UnsupportedDevice => CnetError::DeviceMemory,
            DeviceFault::AreaExceeded => CnetError::AreaExceeded,
            DeviceFault::DataType => CnetError::DataTypeMismatch,
        }
    }

    pub fn fenet_code(self) -> FenetError {
        match self {
            DeviceFault::UnsupportedDevice => FenetError::Device,
            DeviceFault::AreaExceeded => FenetError::AreaExceeded,
            DeviceFault::DataType => FenetError::DataType,
        }
    }
}

/// What a device read addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRead {
    Individual(Vec<DeviceVariable>),
    /// `len` bytes of device memory starting at `variable`
    Continuous { variable: DeviceVariable, len: usize },
}

/// Read-requested notification for Cnet and FEnet
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReadContext {
    pub request: DeviceRead,
    /// One value per variable, for individual reads
    pub values: Vec<DeviceValue>,
    /// Little-endian device memory, for continuous reads
    pub data: Vec<u8>,
    fault: Option<DeviceFault>,
}

impl DeviceReadContext {
    pub fn new(request: DeviceRead) -> Self {
        Self {
            request,
            values: Vec::new(),
            data: Vec::new(),
            fault: None,
        }
    }

    pub fn set_fault(&mut self, fault: DeviceFault) {
        self.fault = Some(fault);
    }

    pub fn fault(&self) -> Option<DeviceFault> {
        self.fault
    }

    /// Check the handler filled every slot
    pub(crate) fn result(self) -> Result<DeviceReadResult, DeviceFault> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }
        match self.request {
            DeviceRead::Individual(variables) => {
                if self.values.len() != variables.len() {
                    return Err(DeviceFault::AreaExceeded);
                }
                let typed = variables
                    .iter()
                    .zip(&self.values)
                    .all(|(variable, value)| variable.data_type() == value.data_type());
                if !typed {
                    return Err(DeviceFault::DataType);
                }
                Ok(DeviceReadResult::Values(self.values))
            }
            DeviceRead::Continuous { len, .. } => {
                if self.data.len() != len {
                    return Err(DeviceFault::AreaExceeded);
                }
                Ok(DeviceReadResult::Data(self.data))
            }
        }
    }
}

pub(crate) enum DeviceReadResult {
    Values(Vec<DeviceValue>),
    Data(Vec<u8>),
}

/// What a device write stores
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceWrite {
    Individual(Vec<(DeviceVariable, DeviceValue)>),
    /// Little-endian device memory starting at `variable`
    Continuous { variable: DeviceVariable, data: Vec<u8> },
}

/// Write-requested notification for Cnet and FEnet
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceWriteContext {
    pub request: DeviceWrite,
    fault: Option<DeviceFault>,
}

impl DeviceWriteContext {
    pub fn new(request: DeviceWrite) -> Self {
        Self {
            request,
            fault: None,
        }
    }

    pub fn set_fault(&mut self, fault: DeviceFault) {
        self.fault = Some(fault);
    }

    pub fn fault(&self) -> Option<DeviceFault> {
        self.fault
    }
}

/// Application side of a Cnet or FEnet slave
#[cfg_attr(test, mockall::automock)]
pub trait DeviceRequestHandler: Send + Sync {
    fn on_read(&self, context: &mut DeviceReadContext);
    fn on_write(&self, context: &mut DeviceWriteContext);
}

/// Convert big-endian wire items of `data_type` to little-endian memory
pub(crate) fn swap_items(data: &[u8], data_type: DataType) -> Vec<u8> {
    data.chunks(data_type.size())
        .flat_map(|item| item.iter().rev().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> DeviceVariable {
        DeviceVariable::parse(name).unwrap()
    }

    #[test]
    fn test_read_result_requires_every_slot() {
        let mut context = DeviceReadContext::new(DeviceRead::Individual(vec![var("%MW0"), var("%MW1")]));
        context.values.push(DeviceValue::Word(1));
        assert!(matches!(context.clone().result(), Err(DeviceFault::AreaExceeded)));

        context.values.push(DeviceValue::Byte(2));
        assert!(matches!(context.clone().result(), Err(DeviceFault::DataType)));

        context.values[1] = DeviceValue::Word(2);
        assert!(matches!(context.result(), Ok(DeviceReadResult::Values(v)) if v.len() == 2));
    }

    #[test]
    fn test_fault_wins() {
        let mut context = DeviceReadContext::new(DeviceRead::Continuous { variable: var("%MB0"), len: 2 });
        context.data = vec![0, 0];
        context.set_fault(DeviceFault::UnsupportedDevice);
        assert!(matches!(context.result(), Err(DeviceFault::UnsupportedDevice)));
        assert_eq!(DeviceFault::UnsupportedDevice.fenet_code(), FenetError::Device);
        assert_eq!(DeviceFault::AreaExceeded.cnet_code(), CnetError::AreaExceeded);
    }

    #[test]
    fn test_swap_items() {
        assert_eq!(swap_items(&[0x12, 0x34, 0x56, 0x78], DataType::Word), vec![0x34, 0x12, 0x78, 0x56]);
        assert_eq!(swap_items(&[1, 2], DataType::Byte), vec![1, 2]);
    }
}
