//! Slave server
//!
//! Wires a [`ChannelListener`] to a [`SlaveProtocol`]: every channel the
//! listener produces gets its own [`StreamDispatcher`] task, and the
//! channel is dropped from the listener's registry once that task ends.
//! Channels opened by the application (a serial port, say) are served with
//! [`SlaveServer::serve_channel`] and stay under the caller's control.

use crate::dispatcher::{DispatcherConfig, StreamDispatcher};
use crate::slave::SlaveProtocol;
use plclink_core::error::PlcResult;
use plclink_transport::{ByteChannel, ChannelListener};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;

/// A dispatcher task and the listener-produced channel it serves
struct Served {
    channel: Arc<ByteChannel>,
    task: JoinHandle<()>,
}

type TaskList = Arc<Mutex<Vec<Served>>>;

pub struct SlaveServer<L: ChannelListener + 'static> {
    listener: Arc<L>,
    protocol: Arc<dyn SlaveProtocol>,
    config: DispatcherConfig,
    tasks: TaskList,
}

fn track(tasks: &TaskList, served: Served) {
    let mut tasks = tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    tasks.retain(|entry| !entry.task.is_finished());
    tasks.push(served);
}

impl<L: ChannelListener + 'static> SlaveServer<L> {
    pub fn new(listener: L, protocol: Arc<dyn SlaveProtocol>) -> Self {
        Self::with_config(listener, protocol, DispatcherConfig::default())
    }

    pub fn with_config(listener: L, protocol: Arc<dyn SlaveProtocol>, config: DispatcherConfig) -> Self {
        let listener = Arc::new(listener);
        let tasks: TaskList = Arc::default();

        let weak: Weak<L> = Arc::downgrade(&listener);
        let handler_protocol = protocol.clone();
        let handler_tasks = tasks.clone();
        listener.on_channel_created(Arc::new(move |channel: Arc<ByteChannel>| {
            log::info!(
                "[{}] serving {}",
                channel.description(),
                handler_protocol.name()
            );
            let dispatcher = StreamDispatcher::with_config(channel.clone(), handler_protocol.clone(), config);
            let listener = weak.clone();
            let served = channel.clone();
            let task = tokio::spawn(async move {
                dispatcher.run().await;
                if !channel.is_closed() {
                    return;
                }
                if let Some(listener) = listener.upgrade() {
                    listener.remove_channel(&channel);
                }
            });
            track(&handler_tasks, Served { channel: served, task });
        }));

        Self {
            listener,
            protocol,
            config,
            tasks,
        }
    }

    pub fn listener(&self) -> &Arc<L> {
        &self.listener
    }

    pub fn protocol(&self) -> &Arc<dyn SlaveProtocol> {
        &self.protocol
    }

    pub async fn start(&self) -> PlcResult<()> {
        self.listener.start().await?;
        log::info!(
            "{} slave listening on {:?}",
            self.protocol.name(),
            self.listener.local_addr()
        );
        Ok(())
    }

    /// Stop the listener, every dispatcher task and the channels they served
    pub async fn stop(&self) {
        self.listener.stop().await;
        let served: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for Served { channel, task } in served {
            task.abort();
            let _ = task.await;
            channel.close().await;
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve a channel the caller opened and keeps ownership of
    pub fn serve_channel(&self, channel: Arc<ByteChannel>) -> JoinHandle<()> {
        StreamDispatcher::with_config(channel, self.protocol.clone(), self.config).spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slave::ModbusSlave;
    use crate::store::MemoryModbusStore;
    use plclink_codec::modbus::{tcp, ModbusFraming, ModbusRequest, ModbusResponse};
    use plclink_core::logging::{CommEventKind, MemoryCommLogger};
    use plclink_transport::{ListenerSettings, TcpChannelListener};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn server(config: DispatcherConfig) -> (SlaveServer<TcpChannelListener>, Arc<MemoryModbusStore>) {
        let store = Arc::new(MemoryModbusStore::new());
        let slave = ModbusSlave::new(ModbusFraming::Tcp, store.clone());
        let listener = TcpChannelListener::new(ListenerSettings::new("127.0.0.1:0"));
        (SlaveServer::with_config(listener, Arc::new(slave), config), store)
    }

    #[tokio::test]
    async fn test_serves_accepted_connection() {
        let (server, store) = server(DispatcherConfig::default());
        store.set_holding_registers(10, &[0xCAFE, 0xBEEF]);
        server.start().await.unwrap();

        let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
        let request = ModbusRequest::ReadHoldingRegisters { address: 10, quantity: 2 };
        stream.write_all(&tcp::encode(5, 1, &request.encode())).await.unwrap();

        let mut response = vec![0u8; 13];
        stream.read_exact(&mut response).await.unwrap();
        let (header, pdu) = tcp::decode(&response).unwrap();
        assert_eq!(header.transaction_id, 5);
        assert_eq!(
            ModbusResponse::decode(pdu).unwrap().registers(),
            Some(&[0xCAFE, 0xBEEF][..])
        );

        server.stop().await;
    }

    #[tokio::test]
    async fn test_idle_connection_closed_and_untracked() {
        let (server, _store) = server(DispatcherConfig {
            idle_timeout_ms: 100,
            max_error_accumulator: 256,
        });
        server.start().await.unwrap();

        let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
        wait_for(|| server.listener().channels().len() == 1).await;

        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        wait_for(|| server.listener().channels().is_empty()).await;

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_served_channels() {
        let logger = Arc::new(MemoryCommLogger::new());
        let store = Arc::new(MemoryModbusStore::new());
        let slave = ModbusSlave::new(ModbusFraming::Tcp, store);
        let listener =
            TcpChannelListener::with_logger(ListenerSettings::new("127.0.0.1:0"), logger.clone());
        let server = SlaveServer::new(listener, Arc::new(slave));
        server.start().await.unwrap();

        let mut stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
        wait_for(|| server.listener().channels().len() == 1).await;
        let channel = server.listener().channels()[0].clone();

        server.stop().await;
        assert!(channel.is_closed());
        assert_eq!(logger.count(CommEventKind::ChannelOpened), 1);
        assert_eq!(logger.count(CommEventKind::ChannelClosed), 1);

        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
