//! plclink - multi-protocol PLC communication toolkit
//!
//! Master and slave sides of Modbus (RTU, ASCII, TCP) and the LS XGT
//! Cnet and FEnet protocols over TCP, UDP, serial ports or any async stream.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `plclink-core`: errors, NAK codes, device values and variables, comm log events
//! - `plclink-transport`: `ByteChannel`, transports and channel listeners
//! - `plclink-codec`: frame codecs and checksums per protocol
//! - `plclink-client`: `RequestEngine` and typed masters
//! - `plclink-server`: `StreamDispatcher`, protocol slaves and in-memory stores
//!
//! # Usage
//!
//! ```no_run
//! use plclink::client::ModbusMaster;
//! use plclink::codec::modbus::ModbusFraming;
//! use plclink::transport::ChannelBuilder;
//! use std::sync::Arc;
//!
//! # async fn run() -> plclink::PlcResult<()> {
//! let channel = ChannelBuilder::new().tcp("192.168.0.10", 502).open().await?;
//! let master = ModbusMaster::new(Arc::new(channel), ModbusFraming::Tcp, 1);
//! let registers = master.read_holding_registers(0, 10).await?;
//! # Ok(())
//! # }
//! ```

pub use plclink_core::datatypes::{DataType, DeviceValue, DeviceVariable};
pub use plclink_core::nak::{CnetError, FenetError, ModbusException, NakCode};
pub use plclink_core::{PlcError, PlcResult};

pub mod logging {
    pub use plclink_core::logging::*;
}

pub mod transport {
    pub use plclink_transport::*;
}

pub mod codec {
    pub use plclink_codec::*;
}

pub mod client {
    pub use plclink_client::*;
}

pub mod server {
    pub use plclink_server::*;
}
