//! Data types used by the PLC protocols

pub mod device_value;
pub mod device_variable;

pub use device_value::{DataType, DeviceValue};
pub use device_variable::{DeviceVariable, MAX_VARIABLE_NAME_LENGTH};
