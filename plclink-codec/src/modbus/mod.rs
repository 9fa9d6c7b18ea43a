//! Modbus codecs
//!
//! The PDU layer ([`pdu`]) is shared; [`rtu`], [`ascii`] and [`tcp`] wrap it
//! in their respective application data units.

pub mod ascii;
pub mod pdu;
pub mod rtu;
pub mod tcp;
pub mod values;

use crate::framing::FrameCheck;
use plclink_core::nak::NakCode;

pub use pdu::{FunctionCode, ModbusRequest, ModbusResponse};

/// Application data unit variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusFraming {
    Rtu,
    Ascii,
    Tcp,
}

/// A framed PDU with its addressing fields
///
/// `transaction_id` is only carried by TCP; serial framings decode it as 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusAdu {
    pub transaction_id: u16,
    /// Station address (serial) or unit id (TCP)
    pub unit_id: u8,
    pub pdu: Vec<u8>,
}

impl ModbusFraming {
    /// Bytes to collect before the first [`check_request`](Self::check_request)
    pub fn header_len(self) -> usize {
        match self {
            ModbusFraming::Rtu => 2,
            ModbusFraming::Ascii => 1,
            ModbusFraming::Tcp => tcp::MBAP_HEADER_LEN,
        }
    }

    pub fn encode(self, adu: &ModbusAdu) -> Vec<u8> {
        match self {
            ModbusFraming::Rtu => rtu::encode(adu.unit_id, &adu.pdu),
            ModbusFraming::Ascii => ascii::encode(adu.unit_id, &adu.pdu),
            ModbusFraming::Tcp => tcp::encode(adu.transaction_id, adu.unit_id, &adu.pdu),
        }
    }

    pub fn decode(self, frame: &[u8]) -> Result<ModbusAdu, NakCode> {
        match self {
            ModbusFraming::Rtu => {
                let (unit_id, pdu) = rtu::decode(frame)?;
                Ok(ModbusAdu { transaction_id: 0, unit_id, pdu: pdu.to_vec() })
            }
            ModbusFraming::Ascii => {
                let (unit_id, pdu) = ascii::decode(frame)?;
                Ok(ModbusAdu { transaction_id: 0, unit_id, pdu })
            }
            ModbusFraming::Tcp => {
                let (header, pdu) = tcp::decode(frame)?;
                Ok(ModbusAdu {
                    transaction_id: header.transaction_id,
                    unit_id: header.unit_id,
                    pdu: pdu.to_vec(),
                })
            }
        }
    }

    pub fn check_request(self, buf: &[u8]) -> Result<FrameCheck, NakCode> {
        match self {
            ModbusFraming::Rtu => rtu::check_request(buf),
            ModbusFraming::Ascii => ascii::check(buf),
            ModbusFraming::Tcp => tcp::check(buf),
        }
    }

    pub fn check_response(self, buf: &[u8]) -> Result<FrameCheck, NakCode> {
        match self {
            ModbusFraming::Rtu => rtu::check_response(buf),
            ModbusFraming::Ascii => ascii::check(buf),
            ModbusFraming::Tcp => tcp::check(buf),
        }
    }
}
