//! Duplex byte channel over one concrete transport
//!
//! A [`ByteChannel`] owns a background receive worker that continuously pulls
//! raw chunks from the transport into a FIFO buffer and signals blocked
//! readers. Reads lock the buffer only to check and dequeue; waiting for new
//! data happens outside the lock on a [`Notify`].

use crate::error::{PlcError, PlcResult};
use bytes::{Buf, Bytes, BytesMut};
use plclink_core::logging::{CommEvent, CommEventKind, CommLogger};
use plclink_core::nak::NakCode;
use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::futures::Notified;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

/// Size of a single transport read
const READ_CHUNK_SIZE: usize = 4096;

/// Maximum UDP payload size
pub const MAX_UDP_PAYLOAD_SIZE: usize = 65507;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Transport a channel runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    TcpClient,
    /// One connection accepted by a TCP listener
    TcpAccepted,
    UdpClient,
    /// One remote endpoint demultiplexed by a UDP listener
    UdpPeer,
    Serial,
    Stream,
}

impl ChannelKind {
    /// Whether the channel was produced by a [`ChannelListener`](crate::listener::ChannelListener)
    pub fn is_listener_produced(&self) -> bool {
        matches!(self, ChannelKind::TcpAccepted | ChannelKind::UdpPeer)
    }
}

/// Where the receive worker pulls bytes from
pub(crate) enum ReceiveSource {
    Stream(Box<dyn AsyncRead + Send + Unpin>),
    /// A connected UDP socket
    Socket(Arc<UdpSocket>),
    /// Datagrams routed by a UDP listener
    Datagrams(mpsc::UnboundedReceiver<Bytes>),
}

enum ChannelWriter {
    Stream(tokio::sync::Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>),
    Datagram {
        socket: Arc<UdpSocket>,
        /// `None` for a connected socket
        peer: Option<SocketAddr>,
    },
}

/// State shared between a channel and its receive worker
struct ChannelShared {
    buffer: Mutex<BytesMut>,
    signal: Notify,
    closed: AtomicBool,
}

impl ChannelShared {
    fn new() -> Self {
        Self {
            buffer: Mutex::new(BytesMut::with_capacity(READ_CHUNK_SIZE)),
            signal: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, data: &[u8]) {
        self.lock().extend_from_slice(data);
        self.signal.notify_waiters();
    }

    /// Mark the transport unusable and wake every blocked reader
    fn fail(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.signal.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Duplex byte pipe with buffered, timeout-bounded reads
///
/// Created on connect (client transports) or on accept (listeners). Closing
/// is idempotent: it wakes any pending reader, stops and joins the receive
/// worker and releases the transport.
pub struct ByteChannel {
    id: u64,
    kind: ChannelKind,
    description: String,
    peer: Option<SocketAddr>,
    shared: Arc<ChannelShared>,
    writer: ChannelWriter,
    worker: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
    logger: Arc<dyn CommLogger>,
}

impl ByteChannel {
    fn new(
        kind: ChannelKind,
        description: String,
        peer: Option<SocketAddr>,
        writer: ChannelWriter,
        source: ReceiveSource,
        logger: Arc<dyn CommLogger>,
    ) -> Self {
        let shared = Arc::new(ChannelShared::new());
        let worker = tokio::spawn(receive_worker(source, shared.clone(), description.clone()));
        logger.log(&CommEvent::new(CommEventKind::ChannelOpened, &description, &[]));

        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            description,
            peer,
            shared,
            writer,
            worker: Mutex::new(Some(worker)),
            disposed: AtomicBool::new(false),
            logger,
        }
    }

    /// Create a channel over any duplex byte stream
    pub fn from_stream<S>(
        stream: S,
        kind: ChannelKind,
        description: impl Into<String>,
        logger: Arc<dyn CommLogger>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(
            kind,
            description.into(),
            None,
            ChannelWriter::Stream(tokio::sync::Mutex::new(Some(Box::new(writer)))),
            ReceiveSource::Stream(Box::new(reader)),
            logger,
        )
    }

    pub(crate) fn from_tcp(
        stream: TcpStream,
        kind: ChannelKind,
        logger: Arc<dyn CommLogger>,
    ) -> Self {
        let peer = stream.peer_addr().ok();
        let description = match peer {
            Some(addr) => format!("tcp {}", addr),
            None => "tcp".to_string(),
        };
        let (reader, writer) = stream.into_split();
        Self::new(
            kind,
            description,
            peer,
            ChannelWriter::Stream(tokio::sync::Mutex::new(Some(Box::new(writer)))),
            ReceiveSource::Stream(Box::new(reader)),
            logger,
        )
    }

    /// `socket` must already be connected to its peer
    pub(crate) fn from_udp_socket(socket: UdpSocket, logger: Arc<dyn CommLogger>) -> Self {
        let peer = socket.peer_addr().ok();
        let description = match peer {
            Some(addr) => format!("udp {}", addr),
            None => "udp".to_string(),
        };
        let socket = Arc::new(socket);
        Self::new(
            ChannelKind::UdpClient,
            description,
            peer,
            ChannelWriter::Datagram {
                socket: socket.clone(),
                peer: None,
            },
            ReceiveSource::Socket(socket),
            logger,
        )
    }

    pub(crate) fn from_datagrams(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        datagrams: mpsc::UnboundedReceiver<Bytes>,
        logger: Arc<dyn CommLogger>,
    ) -> Self {
        Self::new(
            ChannelKind::UdpPeer,
            format!("udp {}", peer),
            Some(peer),
            ChannelWriter::Datagram {
                socket,
                peer: Some(peer),
            },
            ReceiveSource::Datagrams(datagrams),
            logger,
        )
    }

    /// Process-unique channel id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Remote endpoint, when the transport has one
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn logger(&self) -> &Arc<dyn CommLogger> {
        &self.logger
    }

    /// Emit a structured event on this channel's logger
    pub fn log(&self, kind: CommEventKind, bytes: &[u8]) {
        self.logger
            .log(&CommEvent::new(kind, &self.description, bytes));
    }

    /// Emit an event carrying a protocol code
    pub fn log_code(&self, kind: CommEventKind, bytes: &[u8], code: NakCode) {
        self.logger
            .log(&CommEvent::new(kind, &self.description, bytes).with_code(code));
    }

    /// True once the transport failed or the channel was closed
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Send `data` as one atomic write
    ///
    /// Concurrent writers never interleave: the writer lock is held for the
    /// whole send. A transport failure closes the channel and is reported
    /// as [`PlcError::Timeout`].
    pub async fn write(&self, data: &[u8]) -> PlcResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(PlcError::AlreadyDisposed);
        }
        if self.is_closed() {
            return Err(PlcError::Timeout);
        }

        let result = match &self.writer {
            ChannelWriter::Stream(writer) => {
                let mut guard = writer.lock().await;
                match guard.as_mut() {
                    Some(w) => match w.write_all(data).await {
                        Ok(()) => w.flush().await,
                        Err(e) => Err(e),
                    },
                    None => Err(std::io::Error::new(
                        std::io::ErrorKind::NotConnected,
                        "stream writer released",
                    )),
                }
            }
            ChannelWriter::Datagram { socket, peer } => match peer {
                Some(addr) => socket.send_to(data, *addr).await.map(|_| ()),
                None => socket.send(data).await.map(|_| ()),
            },
        };

        if let Err(e) = result {
            log::warn!("[{}] write failed: {}", self.description, e);
            self.close().await;
            return Err(PlcError::Timeout);
        }
        Ok(())
    }

    /// Read the next byte, waiting up to `timeout_ms` (0 waits indefinitely)
    ///
    /// Fails with [`PlcError::Timeout`] when nothing arrives in time or when
    /// the transport has closed and the buffer is empty.
    pub async fn read_byte(&self, timeout_ms: u64) -> PlcResult<u8> {
        loop {
            let notified = self.shared.signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut buffer = self.shared.lock();
                if buffer.has_remaining() {
                    return Ok(buffer.get_u8());
                }
            }
            if self.is_closed() {
                return Err(PlcError::Timeout);
            }
            wait_for_data(notified, timeout_ms).await?;
        }
    }

    /// Read exactly `count` bytes or fail with [`PlcError::Timeout`]
    ///
    /// `timeout_ms` bounds each wait for more data, not the whole call: a
    /// slow trickle that beats every individual deadline succeeds even if it
    /// takes longer than `timeout_ms` overall. Bytes consumed before a
    /// timeout are discarded.
    pub async fn read_bytes(&self, count: usize, timeout_ms: u64) -> PlcResult<Vec<u8>> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let notified = self.shared.signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let taken = {
                let mut buffer = self.shared.lock();
                let n = buffer.len().min(count - out.len());
                out.extend_from_slice(&buffer.split_to(n));
                n
            };
            if out.len() == count {
                break;
            }
            if taken == 0 {
                if self.is_closed() {
                    return Err(PlcError::Timeout);
                }
                wait_for_data(notified, timeout_ms).await?;
            }
        }
        Ok(out)
    }

    /// Drain whatever is buffered or immediately available; never blocks
    pub async fn read_all_buffered(&self) -> Vec<u8> {
        // Let the receive worker move anything already readable into the buffer.
        tokio::task::yield_now().await;
        let mut buffer = self.shared.lock();
        let len = buffer.len();
        buffer.split_to(len).to_vec()
    }

    /// Best-effort count of buffered bytes
    pub fn bytes_available(&self) -> usize {
        self.shared.lock().len()
    }

    /// Close the channel; idempotent
    pub async fn close(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.fail();
        self.shared.lock().clear();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = worker {
            handle.abort();
            let _ = handle.await;
        }

        if let ChannelWriter::Stream(writer) = &self.writer {
            if let Some(mut w) = writer.lock().await.take() {
                let _ = w.shutdown().await;
            }
        }

        self.log(CommEventKind::ChannelClosed, &[]);
    }
}

impl fmt::Debug for ByteChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteChannel")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for ByteChannel {
    fn drop(&mut self) {
        self.shared.fail();
        if let Some(handle) = self
            .worker
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

async fn wait_for_data(notified: Pin<&mut Notified<'_>>, timeout_ms: u64) -> PlcResult<()> {
    if timeout_ms == 0 {
        notified.await;
        Ok(())
    } else {
        tokio::time::timeout(Duration::from_millis(timeout_ms), notified)
            .await
            .map_err(|_| PlcError::Timeout)
    }
}

async fn receive_worker(source: ReceiveSource, shared: Arc<ChannelShared>, description: String) {
    match source {
        ReceiveSource::Stream(mut reader) => {
            let mut chunk = vec![0u8; READ_CHUNK_SIZE];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => {
                        log::debug!("[{}] remote end closed", description);
                        break;
                    }
                    Ok(n) => shared.push(&chunk[..n]),
                    Err(e) => {
                        log::warn!("[{}] receive failed: {}", description, e);
                        break;
                    }
                }
            }
        }
        ReceiveSource::Socket(socket) => {
            let mut datagram = vec![0u8; MAX_UDP_PAYLOAD_SIZE];
            loop {
                match socket.recv(&mut datagram).await {
                    Ok(n) => shared.push(&datagram[..n]),
                    Err(e) => {
                        log::warn!("[{}] receive failed: {}", description, e);
                        break;
                    }
                }
            }
        }
        ReceiveSource::Datagrams(mut datagrams) => {
            while let Some(datagram) = datagrams.recv().await {
                shared.push(&datagram);
            }
            log::debug!("[{}] datagram route closed", description);
        }
    }
    shared.fail();
}
