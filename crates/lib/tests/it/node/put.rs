use std::sync::Arc;

use serde_json::json;
use treelike::{
    Adapter, Node, NodeValue, TimestampedValue, WriteOptions, adapter::MemoryAdapter,
};

use crate::helpers::{START, frozen_clock, leaf, memory_node, node_over};

#[tokio::test]
async fn test_older_write_does_not_replace_newer() {
    let (node, _) = memory_node("x");
    node.put_with("a", WriteOptions::at(100)).await.unwrap();
    node.put_with("b", WriteOptions::at(50)).await.unwrap();

    assert_eq!(node.once(false).await, Some(leaf("a")));
}

#[tokio::test]
async fn test_put_stamps_with_node_clock() {
    let clock = frozen_clock();
    let adapter = MemoryAdapter::new();
    let node = Node::new("x", vec![Arc::new(adapter.clone()) as Arc<dyn Adapter>])
        .with_clock(clock.clone());

    node.put(1).await.unwrap();
    assert_eq!(adapter.stored("x").unwrap().updated_at, Some(START));
}

#[tokio::test]
async fn test_composite_put_writes_directory_marker() {
    let (settings, adapter) = memory_node("settings");
    settings
        .put_with(json!({"theme": "dark", "fontSize": 14}), WriteOptions::at(START))
        .await
        .unwrap();

    assert_eq!(
        adapter.stored("settings").unwrap().value,
        NodeValue::Directory
    );
    assert_eq!(settings.once(false).await, Some(NodeValue::Directory));
    assert_eq!(settings.get("theme").once(false).await, Some(leaf("dark")));
    assert_eq!(settings.get("fontSize").once(false).await, Some(leaf(14)));
}

#[tokio::test]
async fn test_nested_composite_put() {
    let (root, adapter) = memory_node("root");
    root.put_with(
        json!({"chats": {"abc": {"latest": "hi", "members": ["a", "b"]}}}),
        WriteOptions::at(START),
    )
    .await
    .unwrap();

    let paths: Vec<String> = adapter.entries().into_iter().map(|(p, _)| p).collect();
    assert_eq!(
        paths,
        vec![
            "root",
            "root/chats",
            "root/chats/abc",
            "root/chats/abc/latest",
            "root/chats/abc/members",
        ]
    );
    // Arrays are leaves
    assert_eq!(
        root.get("chats/abc/members").once(false).await,
        Some(leaf(json!(["a", "b"])))
    );
}

#[tokio::test]
async fn test_put_reaches_every_adapter() {
    let adapters = vec![MemoryAdapter::new(), MemoryAdapter::new(), MemoryAdapter::new()];
    let node = node_over("x", &adapters);
    node.put_with("v", WriteOptions::at(7)).await.unwrap();

    for adapter in &adapters {
        assert_eq!(
            adapter.stored("x"),
            Some(TimestampedValue::new(leaf("v"), 7))
        );
    }
}

#[tokio::test]
async fn test_equal_stamps_converge_on_greater_value() {
    // Same two writes, opposite arrival order, on separate replicas
    let forward = MemoryAdapter::new();
    let backward = MemoryAdapter::new();
    let a = node_over("fruit", std::slice::from_ref(&forward));
    let b = node_over("fruit", std::slice::from_ref(&backward));

    a.put_with("apple", WriteOptions::at(10)).await.unwrap();
    a.put_with("banana", WriteOptions::at(10)).await.unwrap();
    b.put_with("banana", WriteOptions::at(10)).await.unwrap();
    b.put_with("apple", WriteOptions::at(10)).await.unwrap();

    assert_eq!(forward.stored("fruit").unwrap().value, leaf("banana"));
    assert_eq!(backward.stored("fruit").unwrap().value, leaf("banana"));
}

#[tokio::test]
async fn test_expired_value_reads_as_absent() {
    let clock = frozen_clock();
    let adapter = MemoryAdapter::with_clock(clock.clone());
    let node = Node::new("session", vec![Arc::new(adapter) as Arc<dyn Adapter>])
        .with_clock(clock.clone());

    node.put_with("token", WriteOptions::at(START).expiring_at(START + 1_000))
        .await
        .unwrap();
    assert_eq!(node.once(true).await, Some(leaf("token")));

    clock.set(START + 1_000);
    assert_eq!(node.once(true).await, None);
}

#[tokio::test]
async fn test_put_with_no_adapters_succeeds() {
    let node = Node::new("x", Vec::new());
    node.put(json!({"a": 1})).await.unwrap();
    assert_eq!(node.once(true).await, None);
}
