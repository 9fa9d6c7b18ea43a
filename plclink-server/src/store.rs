//! In-memory stores backing the handler traits

use crate::handler::{
    DeviceFault, DeviceRead, DeviceReadContext, DeviceRequestHandler, DeviceWrite,
    DeviceWriteContext, ModbusReadContext, ModbusRequestHandler, ModbusTable, ModbusWriteContext,
};
use plclink_core::datatypes::{DataType, DeviceValue, DeviceVariable};
use plclink_core::nak::ModbusException;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct ModbusTables {
    coils: HashMap<u16, bool>,
    discrete_inputs: HashMap<u16, bool>,
    holding_registers: HashMap<u16, u16>,
    input_registers: HashMap<u16, u16>,
}

/// Sparse Modbus data model
///
/// Reads touching an address that was never set fail with
/// [`ModbusException::IllegalDataAddress`]. Writes create addresses.
#[derive(Debug, Default)]
pub struct MemoryModbusStore {
    tables: Mutex<ModbusTables>,
}

impl MemoryModbusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ModbusTables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_coil(&self, address: u16, value: bool) {
        self.lock().coils.insert(address, value);
    }

    pub fn set_discrete_input(&self, address: u16, value: bool) {
        self.lock().discrete_inputs.insert(address, value);
    }

    pub fn set_holding_register(&self, address: u16, value: u16) {
        self.lock().holding_registers.insert(address, value);
    }

    pub fn set_input_register(&self, address: u16, value: u16) {
        self.lock().input_registers.insert(address, value);
    }

    /// Store `values` in consecutive holding registers
    pub fn set_holding_registers(&self, address: u16, values: &[u16]) {
        let mut tables = self.lock();
        for (offset, value) in values.iter().enumerate() {
            tables
                .holding_registers
                .insert(address.wrapping_add(offset as u16), *value);
        }
    }

    /// Store `values` in consecutive input registers
    pub fn set_input_registers(&self, address: u16, values: &[u16]) {
        let mut tables = self.lock();
        for (offset, value) in values.iter().enumerate() {
            tables
                .input_registers
                .insert(address.wrapping_add(offset as u16), *value);
        }
    }

    /// Store an IEEE 754 float in two input registers, high word first
    pub fn set_input_f32(&self, address: u16, value: f32) {
        self.set_input_registers(address, &plclink_codec::modbus::values::f32_to_registers(value));
    }

    /// Store an IEEE 754 float in two holding registers, high word first
    pub fn set_holding_f32(&self, address: u16, value: f32) {
        self.set_holding_registers(address, &plclink_codec::modbus::values::f32_to_registers(value));
    }

    pub fn coil(&self, address: u16) -> Option<bool> {
        self.lock().coils.get(&address).copied()
    }

    pub fn holding_register(&self, address: u16) -> Option<u16> {
        self.lock().holding_registers.get(&address).copied()
    }

    fn read<T: Copy>(
        table: &HashMap<u16, T>,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<T>, ModbusException> {
        (0..quantity)
            .map(|offset| {
                let at = address
                    .checked_add(offset)
                    .ok_or(ModbusException::IllegalDataAddress)?;
                table
                    .get(&at)
                    .copied()
                    .ok_or(ModbusException::IllegalDataAddress)
            })
            .collect()
    }
}

impl ModbusRequestHandler for MemoryModbusStore {
    fn on_read(&self, context: &mut ModbusReadContext) {
        let tables = self.lock();
        let (address, quantity) = (context.address, context.quantity);
        let result = match context.table {
            ModbusTable::Coils => Self::read(&tables.coils, address, quantity).map(|v| context.bits = v),
            ModbusTable::DiscreteInputs => {
                Self::read(&tables.discrete_inputs, address, quantity).map(|v| context.bits = v)
            }
            ModbusTable::HoldingRegisters => {
                Self::read(&tables.holding_registers, address, quantity).map(|v| context.registers = v)
            }
            ModbusTable::InputRegisters => {
                Self::read(&tables.input_registers, address, quantity).map(|v| context.registers = v)
            }
        };
        if let Err(code) = result {
            context.set_nak(code);
        }
    }

    fn on_write(&self, context: &mut ModbusWriteContext) {
        let mut tables = self.lock();
        let last = context.bits.len().max(context.registers.len());
        if context.address as usize + last > u16::MAX as usize + 1 {
            context.set_nak(ModbusException::IllegalDataAddress);
            return;
        }
        match context.table {
            ModbusTable::Coils => {
                for (offset, bit) in context.bits.iter().enumerate() {
                    tables.coils.insert(context.address + offset as u16, *bit);
                }
            }
            ModbusTable::HoldingRegisters => {
                for (offset, value) in context.registers.iter().enumerate() {
                    tables
                        .holding_registers
                        .insert(context.address + offset as u16, *value);
                }
            }
            ModbusTable::DiscreteInputs | ModbusTable::InputRegisters => {
                context.set_nak(ModbusException::IllegalFunction);
            }
        }
    }
}

/// Default size of each device memory
pub const DEFAULT_DEVICE_SIZE: usize = 0x10000;

/// Byte-addressed device memory (`%M`, `%D`, ...), little-endian
///
/// Accesses to a device that was not configured fail with
/// [`DeviceFault::UnsupportedDevice`]; accesses past its end fail with
/// [`DeviceFault::AreaExceeded`].
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    devices: Mutex<HashMap<char, Vec<u8>>>,
}

impl MemoryDeviceStore {
    /// Store with `M` and `D` devices of [`DEFAULT_DEVICE_SIZE`] bytes
    pub fn new() -> Self {
        Self::default()
            .with_device('M', DEFAULT_DEVICE_SIZE)
            .with_device('D', DEFAULT_DEVICE_SIZE)
    }

    /// Add (or resize) a zero-filled device of `size` bytes
    pub fn with_device(self, device: char, size: usize) -> Self {
        self.lock()
            .insert(device.to_ascii_uppercase(), vec![0; size]);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<char, Vec<u8>>> {
        self.devices.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn range(
        memory: &[u8],
        variable: &DeviceVariable,
        len: usize,
    ) -> Result<std::ops::Range<usize>, DeviceFault> {
        let start = usize::try_from(variable.byte_offset()).map_err(|_| DeviceFault::AreaExceeded)?;
        let end = start.checked_add(len).ok_or(DeviceFault::AreaExceeded)?;
        if end > memory.len() {
            return Err(DeviceFault::AreaExceeded);
        }
        Ok(start..end)
    }

    pub fn read_value(&self, variable: &DeviceVariable) -> Result<DeviceValue, DeviceFault> {
        let devices = self.lock();
        let memory = devices
            .get(&variable.device())
            .ok_or(DeviceFault::UnsupportedDevice)?;
        let data_type = variable.data_type();
        let range = Self::range(memory, variable, data_type.size())?;
        if data_type == DataType::Bit {
            let byte = memory[range.start];
            return Ok(DeviceValue::Bit(byte >> variable.bit_position() & 1 != 0));
        }
        DeviceValue::from_le_bytes(data_type, &memory[range]).map_err(|_| DeviceFault::DataType)
    }

    pub fn write_value(
        &self,
        variable: &DeviceVariable,
        value: DeviceValue,
    ) -> Result<(), DeviceFault> {
        if value.data_type() != variable.data_type() {
            return Err(DeviceFault::DataType);
        }
        let mut devices = self.lock();
        let memory = devices
            .get_mut(&variable.device())
            .ok_or(DeviceFault::UnsupportedDevice)?;
        let range = Self::range(memory, variable, value.data_type().size())?;
        if let DeviceValue::Bit(bit) = value {
            let mask = 1u8 << variable.bit_position();
            if bit {
                memory[range.start] |= mask;
            } else {
                memory[range.start] &= !mask;
            }
        } else {
            memory[range].copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    /// `len` bytes starting at `variable`
    pub fn read_bytes(&self, variable: &DeviceVariable, len: usize) -> Result<Vec<u8>, DeviceFault> {
        let devices = self.lock();
        let memory = devices
            .get(&variable.device())
            .ok_or(DeviceFault::UnsupportedDevice)?;
        let range = Self::range(memory, variable, len)?;
        Ok(memory[range].to_vec())
    }

    pub fn write_bytes(&self, variable: &DeviceVariable, data: &[u8]) -> Result<(), DeviceFault> {
        let mut devices = self.lock();
        let memory = devices
            .get_mut(&variable.device())
            .ok_or(DeviceFault::UnsupportedDevice)?;
        let range = Self::range(memory, variable, data.len())?;
        memory[range].copy_from_slice(data);
        Ok(())
    }
}

impl DeviceRequestHandler for MemoryDeviceStore {
    fn on_read(&self, context: &mut DeviceReadContext) {
        let result = match &context.request {
            DeviceRead::Individual(variables) => variables
                .iter()
                .map(|variable| self.read_value(variable))
                .collect::<Result<Vec<_>, _>>()
                .map(|values| context.values = values),
            DeviceRead::Continuous { variable, len } => {
                self.read_bytes(variable, *len).map(|data| context.data = data)
            }
        };
        if let Err(fault) = result {
            context.set_fault(fault);
        }
    }

    fn on_write(&self, context: &mut DeviceWriteContext) {
        let result = match &context.request {
            DeviceWrite::Individual(items) => {
                // validate everything first so a failing write changes nothing
                items
                    .iter()
                    .try_for_each(|(variable, value)| {
                        if value.data_type() != variable.data_type() {
                            return Err(DeviceFault::DataType);
                        }
                        self.read_value(variable).map(|_| ())
                    })
                    .and_then(|()| {
                        items
                            .iter()
                            .try_for_each(|(variable, value)| self.write_value(variable, *value))
                    })
            }
            DeviceWrite::Continuous { variable, data } => self.write_bytes(variable, data),
        };
        if let Err(fault) = result {
            context.set_fault(fault);
        }
    }
}
