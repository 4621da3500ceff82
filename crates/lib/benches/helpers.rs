//! Shared helpers for benchmark tests

use std::sync::Arc;

use treelike::{Adapter, Node, TimestampedValue, adapter::MemoryAdapter, value::NodeValue};

/// Creates a memory adapter pre-populated with `entry_count` leaves under `data/`.
///
/// Each entry has format "data/key_N" -> "value_N" where N is the entry index
pub async fn setup_adapter_async(entry_count: usize) -> MemoryAdapter {
    let adapter = MemoryAdapter::new();
    for i in 0..entry_count {
        adapter
            .set(
                &format!("data/key_{i}"),
                TimestampedValue::new(NodeValue::leaf(format!("value_{i}")), 1 + i as u64),
            )
            .await
            .expect("Failed to set value");
    }
    adapter
}

/// A node at `path` over `replicas` fresh memory adapters.
pub fn setup_node(path: &str, replicas: usize) -> Node {
    let adapters = (0..replicas)
        .map(|_| Arc::new(MemoryAdapter::new()) as Arc<dyn Adapter>)
        .collect();
    Node::new(path, adapters)
}
