//! Channel listeners: accept inbound connections as [`ByteChannel`]s
//!
//! A listener tracks every channel it produced in a registry keyed by the
//! remote endpoint. Closed channels are pruned whenever a new connection is
//! registered, and the owner can deregister one explicitly with
//! [`ChannelListener::remove`] or [`ChannelListener::remove_channel`].

use crate::channel::ByteChannel;
use crate::error::{PlcError, PlcResult};
use async_trait::async_trait;
use futures::future::join_all;
use plclink_core::logging::CommLogger;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Callback invoked synchronously for each new channel
pub type ChannelCreatedHandler = Arc<dyn Fn(Arc<ByteChannel>) + Send + Sync>;

/// Which open channel [`ChannelListener::primary_channel`] returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrimaryChannelPolicy {
    #[default]
    MostRecent,
    Oldest,
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSettings {
    /// Address to bind, e.g. `0.0.0.0:502`
    pub bind_address: String,
    pub primary_policy: PrimaryChannelPolicy,
}

impl ListenerSettings {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            primary_policy: PrimaryChannelPolicy::default(),
        }
    }

    /// Bind every interface on `port`
    pub fn any(port: u16) -> Self {
        Self::new(format!("0.0.0.0:{}", port))
    }

    pub fn with_primary_policy(mut self, policy: PrimaryChannelPolicy) -> Self {
        self.primary_policy = policy;
        self
    }
}

/// Accepts inbound connections and hands them out as channels
#[async_trait]
pub trait ChannelListener: Send + Sync {
    /// Bind and begin accepting
    ///
    /// Fails with [`PlcError::AlreadyDisposed`] after [`dispose`](Self::dispose).
    async fn start(&self) -> PlcResult<()>;

    /// Stop accepting and close every channel nobody else retains
    async fn stop(&self);

    /// Stop permanently
    async fn dispose(&self);

    fn is_running(&self) -> bool;

    /// Bound address once started
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Register a callback for each new channel
    ///
    /// Handlers run inside the accept loop; they must not block.
    fn on_channel_created(&self, handler: ChannelCreatedHandler);

    /// Snapshot of the tracked channels
    fn channels(&self) -> Vec<Arc<ByteChannel>>;

    /// The designated default channel, per the listener's policy
    fn primary_channel(&self) -> Option<Arc<ByteChannel>>;

    /// Deregister the channel for `peer`
    fn remove(&self, peer: &SocketAddr) -> Option<Arc<ByteChannel>>;

    /// Deregister `channel` if it is still the one tracked for its peer
    ///
    /// A newer channel from the same endpoint is left in place.
    fn remove_channel(&self, channel: &ByteChannel) -> Option<Arc<ByteChannel>>;
}

struct RegistryEntry {
    sequence: u64,
    channel: Arc<ByteChannel>,
}

/// Registry and lifecycle state shared by listener implementations
pub(crate) struct ListenerCore {
    registry: Mutex<HashMap<SocketAddr, RegistryEntry>>,
    handlers: Mutex<Vec<ChannelCreatedHandler>>,
    task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    sequence: AtomicU64,
    disposed: AtomicBool,
    policy: PrimaryChannelPolicy,
    pub(crate) logger: Arc<dyn CommLogger>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ListenerCore {
    pub(crate) fn new(policy: PrimaryChannelPolicy, logger: Arc<dyn CommLogger>) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            handlers: Mutex::new(Vec::new()),
            task: Mutex::new(None),
            local_addr: Mutex::new(None),
            sequence: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            policy,
            logger,
        }
    }

    /// Fails when disposed or already running
    pub(crate) fn check_startable(&self) -> PlcResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(PlcError::AlreadyDisposed);
        }
        if lock(&self.task).is_some() {
            return Err(PlcError::InvalidState("Listener is already running".to_string()));
        }
        Ok(())
    }

    pub(crate) fn set_running(&self, local_addr: SocketAddr, task: JoinHandle<()>) {
        *lock(&self.local_addr) = Some(local_addr);
        *lock(&self.task) = Some(task);
    }

    pub(crate) fn is_running(&self) -> bool {
        lock(&self.task).is_some()
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    pub(crate) fn add_handler(&self, handler: ChannelCreatedHandler) {
        lock(&self.handlers).push(handler);
    }

    /// Prune closed channels, track `channel` and notify handlers
    pub(crate) fn register(&self, peer: SocketAddr, channel: Arc<ByteChannel>) {
        {
            let mut registry = lock(&self.registry);
            registry.retain(|_, entry| !entry.channel.is_closed());
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
            registry.insert(
                peer,
                RegistryEntry {
                    sequence,
                    channel: channel.clone(),
                },
            );
        }

        let handlers = lock(&self.handlers).clone();
        for handler in handlers {
            handler(channel.clone());
        }
    }

    pub(crate) fn remove(&self, peer: &SocketAddr) -> Option<Arc<ByteChannel>> {
        lock(&self.registry).remove(peer).map(|entry| entry.channel)
    }

    pub(crate) fn remove_channel(&self, channel: &ByteChannel) -> Option<Arc<ByteChannel>> {
        let peer = channel.peer_addr()?;
        let mut registry = lock(&self.registry);
        match registry.get(&peer) {
            Some(entry) if entry.channel.id() == channel.id() => {
                registry.remove(&peer).map(|entry| entry.channel)
            }
            _ => None,
        }
    }

    pub(crate) fn channels(&self) -> Vec<Arc<ByteChannel>> {
        let registry = lock(&self.registry);
        let mut entries: Vec<_> = registry.values().collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries.into_iter().map(|entry| entry.channel.clone()).collect()
    }

    pub(crate) fn primary_channel(&self) -> Option<Arc<ByteChannel>> {
        let registry = lock(&self.registry);
        let open = registry.values().filter(|entry| !entry.channel.is_closed());
        let chosen = match self.policy {
            PrimaryChannelPolicy::MostRecent => open.max_by_key(|entry| entry.sequence),
            PrimaryChannelPolicy::Oldest => open.min_by_key(|entry| entry.sequence),
        };
        chosen.map(|entry| entry.channel.clone())
    }

    pub(crate) async fn stop(&self) {
        let task = lock(&self.task).take();
        if let Some(handle) = task {
            handle.abort();
            let _ = handle.await;
        }
        *lock(&self.local_addr) = None;

        let drained: Vec<_> = lock(&self.registry).drain().map(|(_, e)| e.channel).collect();
        // The registry held one reference; anything more means an owner kept it.
        let unretained: Vec<_> = drained
            .into_iter()
            .filter(|channel| Arc::strong_count(channel) == 1)
            .collect();
        join_all(unretained.iter().map(|channel| channel.close())).await;
    }

    /// Abort the accept loop without awaiting it
    pub(crate) fn abort(&self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }

    pub(crate) async fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.stop().await;
        lock(&self.handlers).clear();
    }
}
