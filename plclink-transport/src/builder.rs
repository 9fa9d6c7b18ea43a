//! Builder for client channels

use crate::channel::ByteChannel;
use crate::error::{PlcError, PlcResult};
use crate::serial::{SerialSettings, SerialTransport};
use crate::stream::TransportLayer;
use crate::tcp::{TcpSettings, TcpTransport};
use crate::udp::{UdpSettings, UdpTransport};
use plclink_core::logging::{default_logger, CommLogger};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Transport selection for [`ChannelBuilder`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportSettings {
    Tcp(TcpSettings),
    Udp(UdpSettings),
    Serial(SerialSettings),
}

/// Builder for creating client [`ByteChannel`]s
///
/// # Example
///
/// ```no_run
/// use plclink_transport::ChannelBuilder;
///
/// # async fn example() -> plclink_transport::PlcResult<()> {
/// let channel = ChannelBuilder::new()
///     .tcp("192.168.0.10", 502)
///     .connect_timeout(std::time::Duration::from_secs(3))
///     .open()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ChannelBuilder {
    transport: Option<TransportSettings>,
    connect_timeout: Option<Duration>,
    logger: Option<Arc<dyn CommLogger>>,
}

impl ChannelBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            connect_timeout: None,
            logger: None,
        }
    }

    /// Use TCP transport
    pub fn tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.transport = Some(TransportSettings::Tcp(TcpSettings::new(host, port)));
        self
    }

    /// Use UDP transport
    pub fn udp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.transport = Some(TransportSettings::Udp(UdpSettings::new(host, port)));
        self
    }

    /// Use serial transport with 8N1 framing
    pub fn serial(mut self, port_name: impl Into<String>, baud_rate: u32) -> Self {
        self.transport = Some(TransportSettings::Serial(SerialSettings::new(
            port_name, baud_rate,
        )));
        self
    }

    /// Use fully specified transport settings
    pub fn settings(mut self, settings: TransportSettings) -> Self {
        self.transport = Some(settings);
        self
    }

    /// TCP connect timeout; ignored by other transports
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn CommLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the transport without opening it
    pub fn build(self) -> PlcResult<Box<dyn TransportLayer>> {
        let logger = self.logger.unwrap_or_else(default_logger);
        let transport = self.transport.ok_or_else(|| {
            PlcError::InvalidData("Transport type must be specified".to_string())
        })?;

        Ok(match transport {
            TransportSettings::Tcp(mut settings) => {
                if let Some(timeout) = self.connect_timeout {
                    settings.connect_timeout_ms = timeout.as_millis() as u64;
                }
                Box::new(TcpTransport::new(settings).with_logger(logger))
            }
            TransportSettings::Udp(settings) => {
                Box::new(UdpTransport::new(settings).with_logger(logger))
            }
            TransportSettings::Serial(settings) => {
                Box::new(SerialTransport::new(settings).with_logger(logger))
            }
        })
    }

    /// Build and open the channel
    pub async fn open(self) -> PlcResult<ByteChannel> {
        self.build()?.open().await
    }
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self::new()
    }
}
