//! Frame codecs for PLC protocols
//!
//! Pure encode/decode of requests and responses, plus the incremental
//! framing checks readers use to find frame boundaries in a byte stream.
//! Every decode failure maps to one protocol-specific code from
//! [`plclink_core::nak`].
//!
//! # Protocols
//!
//! ## Modbus
//! - [x] RTU (CRC16, poly 0xA001)
//! - [x] ASCII (LRC, `:` ... CR LF)
//! - [x] TCP (MBAP header)
//! - [x] FC01-FC06, FC15, FC16 and exception responses
//!
//! ## LS XGT Cnet
//! - [x] RSS/RSB/WSS/WSB
//! - [x] Monitor register/execute (X##, Y##)
//! - [x] BCC mode
//!
//! ## LS XGT FEnet
//! - [x] Read/write individual and continuous
//! - [x] Optional header BCC

pub mod checksum;
pub mod cnet;
pub mod fenet;
pub mod framing;
pub mod hex;
pub mod modbus;

pub use cnet::{CnetHeader, CnetRequest, CnetRequestBody, CnetResponse, CnetResponsePayload};
pub use fenet::{
    FenetCodec, FenetCommand, FenetDataType, FenetRequest, FenetRequestBody, FenetResponse,
    FenetResponseBody,
};
pub use framing::FrameCheck;
pub use modbus::{FunctionCode, ModbusAdu, ModbusFraming, ModbusRequest, ModbusResponse};
