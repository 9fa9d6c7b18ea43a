//! Transport layer for plclink
//!
//! This crate provides [`ByteChannel`], a duplex byte pipe with buffered,
//! timeout-bounded reads, over TCP, UDP, serial ports and arbitrary streams,
//! plus TCP/UDP [`ChannelListener`]s for the slave side.

pub mod builder;
pub mod channel;
pub mod error;
pub mod listener;
pub mod serial;
pub mod stream;
pub mod tcp;
pub mod tcp_listener;
pub mod udp;
pub mod udp_listener;

pub use builder::{ChannelBuilder, TransportSettings};
pub use channel::{ByteChannel, ChannelKind, MAX_UDP_PAYLOAD_SIZE};
pub use error::{PlcError, PlcResult};
pub use listener::{ChannelCreatedHandler, ChannelListener, ListenerSettings, PrimaryChannelPolicy};
pub use serial::{DataBits, Handshake, Parity, SerialSettings, SerialTransport, StopBits};
pub use stream::{StreamTransport, TransportLayer};
pub use tcp::{TcpSettings, TcpTransport};
pub use tcp_listener::TcpChannelListener;
pub use udp::{UdpSettings, UdpTransport};
pub use udp_listener::UdpChannelListener;
