//! Same-device broadcast adapter.
//!
//! A shared [`BroadcastHub`] routes writes between [`BroadcastAdapter`]
//! instances joined to the same channel name, each of which otherwise
//! behaves exactly like a [`MemoryAdapter`]. Peers only see writes made
//! after they joined; pair this adapter with a persistent one to share
//! history.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Adapter, Callback, MemoryAdapter};
use crate::{
    Result,
    clock::{Clock, SystemClock},
    subscription::{Subscription, lock},
    value::TimestampedValue,
};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct BroadcastMessage {
    origin: Uuid,
    path: String,
    value: TimestampedValue,
}

/// Shared broadcast network, one channel per name.
///
/// Cloning yields another handle to the same set of channels.
#[derive(Clone, Debug, Default)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<BroadcastMessage>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the broadcast channel for `name`.
    fn channel(&self, name: &str) -> broadcast::Sender<BroadcastMessage> {
        lock(&self.channels)
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

/// A memory adapter whose accepted writes are rebroadcast to its peers.
///
/// Writes received from peers go through the resolver and are never
/// rebroadcast. Must be created from within a Tokio runtime; the receive
/// task stops when the adapter is dropped.
pub struct BroadcastAdapter {
    id: Uuid,
    name: String,
    core: MemoryAdapter,
    sender: broadcast::Sender<BroadcastMessage>,
    receiver_task: JoinHandle<()>,
}

impl BroadcastAdapter {
    pub fn new(hub: &BroadcastHub, name: impl Into<String>) -> Self {
        Self::with_clock(hub, name, Arc::new(SystemClock))
    }

    pub fn with_clock(hub: &BroadcastHub, name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let name = name.into();
        let id = Uuid::new_v4();
        let core = MemoryAdapter::with_clock(clock);
        let sender = hub.channel(&name);
        let mut receiver = sender.subscribe();

        let inbound = core.clone();
        let channel = name.clone();
        let receiver_task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) if message.origin == id => {}
                    Ok(message) => {
                        debug!(channel = %channel, path = %message.path, "Applying broadcast write");
                        inbound.apply(&message.path, message.value);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(channel = %channel, lagged = n, "Broadcast receiver lagged; writes were skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            id,
            name,
            core,
            sender,
            receiver_task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel_name(&self) -> &str {
        &self.name
    }

    pub fn memory(&self) -> &MemoryAdapter {
        &self.core
    }
}

impl Drop for BroadcastAdapter {
    fn drop(&mut self) {
        self.receiver_task.abort();
    }
}

#[async_trait]
impl Adapter for BroadcastAdapter {
    fn get(&self, path: &str, callback: Callback) -> Subscription {
        self.core.get(path, callback)
    }

    async fn set(&self, path: &str, value: TimestampedValue) -> Result<()> {
        value.require_updated_at(path)?;
        if !self.core.apply(path, value.clone()) {
            return Ok(());
        }
        let message = BroadcastMessage {
            origin: self.id,
            path: path.to_string(),
            value,
        };
        // Our own receiver keeps the channel open, so this only fails once
        // the adapter is being torn down.
        let _ = self.sender.send(message);
        Ok(())
    }

    fn list(&self, path: &str, callback: Callback) -> Subscription {
        self.core.list(path, callback)
    }
}

impl std::fmt::Debug for BroadcastAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastAdapter")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
