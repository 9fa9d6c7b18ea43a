//! Master-side PLC communication
//!
//! This crate provides the [`RequestEngine`] that runs one request/response
//! transaction at a time on a [`ByteChannel`](plclink_transport::ByteChannel),
//! and typed masters for Modbus, Cnet and FEnet built on it.
//!
//! # Features
//!
//! ## Engine
//! - [x] Framing-driven response assembly with per-read and total timeout
//! - [x] NAK responses surfaced as `PlcError::Nak` with both frames
//! - [x] Transaction/invoke id correlation
//! - [ ] Automatic retry (left to callers)
//!
//! ## Masters
//! - [x] Modbus RTU/ASCII/TCP (FC01-FC06, FC15, FC16)
//! - [x] Cnet read/write individual and continuous, monitors
//! - [x] FEnet read/write individual and continuous

pub mod engine;
pub mod master;

pub use engine::{EngineConfig, MasterProtocol, RequestEngine};
pub use master::{CnetMaster, FenetMaster, ModbusMaster};
