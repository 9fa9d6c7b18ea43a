//! Slave-side PLC communication
//!
//! This crate provides the [`StreamDispatcher`] that serves requests on a
//! [`ByteChannel`](plclink_transport::ByteChannel), protocol slaves that turn
//! request frames into handler calls, and in-memory stores to back them.
//!
//! # Features
//!
//! ## Dispatcher
//! - [x] Framing-driven request assembly with byte-by-byte resync
//! - [x] Unrecognized bytes logged in bounded batches
//! - [x] NAK replies for frames the framing check rejects
//! - [x] Idle timeout for listener-produced channels
//! - [x] Handler panics contained per channel
//!
//! ## Slaves
//! - [x] Modbus RTU/ASCII/TCP with unit filtering and serial broadcast
//! - [x] Cnet read/write individual and continuous, monitors
//! - [x] FEnet read/write individual and continuous
//!
//! ## Stores
//! - [x] Modbus coils, discrete inputs, holding and input registers
//! - [x] Byte-addressed device memory for Cnet and FEnet
//! - [ ] Persistence (stores are memory only)

pub mod dispatcher;
pub mod handler;
pub mod server;
pub mod slave;
pub mod store;

pub use dispatcher::{DispatcherConfig, StreamDispatcher};
pub use handler::{
    DeviceFault, DeviceRead, DeviceReadContext, DeviceRequestHandler, DeviceWrite,
    DeviceWriteContext, ModbusReadContext, ModbusRequestHandler, ModbusTable, ModbusWriteContext,
};
pub use server::SlaveServer;
pub use slave::{CnetSlave, FenetSlave, FrameOutcome, ModbusSlave, SlaveProtocol};
pub use store::{MemoryDeviceStore, MemoryModbusStore};
