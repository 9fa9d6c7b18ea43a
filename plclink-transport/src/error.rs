//! Error types for the transport layer

pub use plclink_core::error::{PlcError, PlcResult};
