//! Serial port transport

use crate::channel::{ByteChannel, ChannelKind};
use crate::error::{PlcError, PlcResult};
use crate::stream::TransportLayer;
use async_trait::async_trait;
use plclink_core::logging::{default_logger, CommLogger};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_serial::{SerialPort, SerialStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => tokio_serial::DataBits::Five,
            DataBits::Six => tokio_serial::DataBits::Six,
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Flow control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handshake {
    None,
    XOnXOff,
    RequestToSend,
}

impl From<Handshake> for tokio_serial::FlowControl {
    fn from(handshake: Handshake) -> Self {
        match handshake {
            Handshake::None => tokio_serial::FlowControl::None,
            Handshake::XOnXOff => tokio_serial::FlowControl::Software,
            Handshake::RequestToSend => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// Serial port transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub handshake: Handshake,
    /// Assert DTR after opening
    pub dtr: bool,
    /// Assert RTS after opening (ignored with hardware handshake)
    pub rts: bool,
}

impl SerialSettings {
    /// Create new serial settings with 8N1 and no handshake
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            handshake: Handshake::None,
            dtr: false,
            rts: false,
        }
    }

    pub fn with_framing(mut self, data_bits: DataBits, parity: Parity, stop_bits: StopBits) -> Self {
        self.data_bits = data_bits;
        self.parity = parity;
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_handshake(mut self, handshake: Handshake) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_lines(mut self, dtr: bool, rts: bool) -> Self {
        self.dtr = dtr;
        self.rts = rts;
        self
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0", 9600)
    }
}

/// Serial port transport
pub struct SerialTransport {
    settings: SerialSettings,
    logger: Arc<dyn CommLogger>,
}

impl SerialTransport {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            logger: default_logger(),
        }
    }

    /// Create serial transport with port name and baud rate
    pub fn new_simple(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self::new(SerialSettings::new(port_name, baud_rate))
    }

    pub fn with_logger(mut self, logger: Arc<dyn CommLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

fn serial_error(context: &str, e: tokio_serial::Error) -> PlcError {
    PlcError::Connection(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{}: {}", context, e),
    ))
}

#[async_trait]
impl TransportLayer for SerialTransport {
    async fn open(&self) -> PlcResult<ByteChannel> {
        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits.into())
            .stop_bits(self.settings.stop_bits.into())
            .parity(self.settings.parity.into())
            .flow_control(self.settings.handshake.into());

        let mut stream = SerialStream::open(&builder)
            .map_err(|e| serial_error("Failed to open serial port", e))?;

        stream
            .write_data_terminal_ready(self.settings.dtr)
            .map_err(|e| serial_error("Failed to set DTR", e))?;
        if self.settings.handshake != Handshake::RequestToSend {
            stream
                .write_request_to_send(self.settings.rts)
                .map_err(|e| serial_error("Failed to set RTS", e))?;
        }

        Ok(ByteChannel::from_stream(
            stream,
            ChannelKind::Serial,
            self.description(),
            self.logger.clone(),
        ))
    }

    fn description(&self) -> String {
        format!("serial {}", self.settings.port_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_builder() {
        let settings = SerialSettings::new("COM3", 19200)
            .with_framing(DataBits::Seven, Parity::Even, StopBits::One)
            .with_handshake(Handshake::XOnXOff)
            .with_lines(true, false);
        assert_eq!(settings.data_bits, DataBits::Seven);
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(
            tokio_serial::FlowControl::from(settings.handshake),
            tokio_serial::FlowControl::Software
        );
        assert!(settings.dtr);
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let transport = SerialTransport::new_simple("/dev/plclink-does-not-exist", 9600);
        assert_eq!(transport.description(), "serial /dev/plclink-does-not-exist");
        assert!(matches!(transport.open().await, Err(PlcError::Connection(_))));
    }
}
