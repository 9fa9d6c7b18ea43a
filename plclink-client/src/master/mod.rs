//! Typed masters per protocol

pub mod cnet;
pub mod fenet;
pub mod modbus;

pub use cnet::{CnetMaster, CnetProtocol};
pub use fenet::{FenetMaster, FenetProtocol};
pub use modbus::{ModbusCall, ModbusMaster, ModbusProtocol, ModbusReply};
