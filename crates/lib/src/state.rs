//! Ready-made roots.
//!
//! [`LocalState`] is the device-local shared tree: persisted to a JSON file and
//! mirrored to other instances on the same [`BroadcastHub`]. It is constructed
//! explicitly so that every owner, including each test, gets its own.
//! [`public_state`] builds a root over a relay.

use std::sync::Arc;

use tracing::info;

use crate::{
    adapter::{Adapter, BroadcastAdapter, BroadcastHub, JsonFileStorage, PersistentAdapter},
    clock::{Clock, SystemClock},
    config::{LocalStateConfig, RelayConfig},
    node::Node,
    relay::{RelayAdapter, RelayClient},
};

/// A persistent, broadcast-backed root node.
#[derive(Debug)]
pub struct LocalState {
    node: Node,
    persistent: Arc<PersistentAdapter>,
    broadcast: Arc<BroadcastAdapter>,
}

impl LocalState {
    /// Opens the local state described by `config`, joined to `hub`.
    ///
    /// Loading the storage file starts in the background; see
    /// [`LocalState::wait_loaded`]. Must be called from within a Tokio runtime.
    pub fn open(config: &LocalStateConfig, hub: &BroadcastHub) -> Self {
        Self::open_with_clock(config, hub, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        config: &LocalStateConfig,
        hub: &BroadcastHub,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            name = %config.name,
            file = %config.storage_file.display(),
            "Opening local state"
        );
        let persistent = PersistentAdapter::open_with_clock(
            Arc::new(JsonFileStorage::new(&config.storage_file)),
            clock.clone(),
        );
        let broadcast = Arc::new(BroadcastAdapter::with_clock(
            hub,
            config.name.clone(),
            clock.clone(),
        ));
        let adapters = vec![
            persistent.clone() as Arc<dyn Adapter>,
            broadcast.clone() as Arc<dyn Adapter>,
        ];
        let node = Node::new(config.name.clone(), adapters).with_clock(clock);
        Self {
            node,
            persistent,
            broadcast,
        }
    }

    /// The root node, at the configured name.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Waits until the storage file has been loaded.
    pub async fn wait_loaded(&self) {
        self.persistent.wait_loaded().await;
    }

    pub fn persistent(&self) -> &PersistentAdapter {
        &self.persistent
    }

    pub fn broadcast(&self) -> &BroadcastAdapter {
        &self.broadcast
    }
}

/// A root node (the empty path) over a relay, reading values from `authors`.
pub fn public_state(client: Arc<dyn RelayClient>, authors: Vec<String>) -> Node {
    let adapter: Arc<dyn Adapter> = Arc::new(RelayAdapter::new(client, authors));
    Node::new("", vec![adapter])
}

/// Like [`public_state`], taking the kind and authors from `config`.
pub fn public_state_with_config(client: Arc<dyn RelayClient>, config: &RelayConfig) -> Node {
    let adapter: Arc<dyn Adapter> = Arc::new(RelayAdapter::from_config(client, config));
    Node::new("", vec![adapter])
}
