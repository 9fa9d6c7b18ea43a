//! Core types and utilities for PLC communication
//!
//! This crate provides the error type, protocol NAK code tables, device
//! values/variables and the communication logging boundary used
//! throughout the plclink implementation.

pub mod datatypes;
pub mod error;
pub mod logging;
pub mod nak;

pub use datatypes::{DataType, DeviceValue, DeviceVariable};
pub use error::{PlcError, PlcResult};
pub use logging::{
    CommEvent, CommEventKind, CommLogger, LogCommLogger, MemoryCommLogger, NullCommLogger,
};
pub use nak::{CnetError, FenetError, ModbusException, ModbusFrameError, NakCode};
