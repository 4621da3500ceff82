use serde_json::json;
use treelike::{
    Adapter, NodeValue, TimestampedValue, WriteOptions,
    adapter::{MemoryAdapter, callback},
};

use crate::helpers::{Recorder, START, leaf, memory_node, node_over};

#[tokio::test]
async fn test_on_reports_current_and_newer_values_only() {
    let (node, _) = memory_node("x");
    node.put_with("a", WriteOptions::at(100)).await.unwrap();

    let rec = Recorder::new();
    let _sub = node.on(rec.callback(), false, 1);

    node.put_with("b", WriteOptions::at(50)).await.unwrap();
    node.put_with("c", WriteOptions::at(200)).await.unwrap();

    assert_eq!(rec.values(), vec![Some(leaf("a")), Some(leaf("c"))]);
}

#[tokio::test]
async fn test_absent_values_are_not_reported() {
    let (node, _) = memory_node("x");
    let rec = Recorder::new();
    let _sub = node.on(rec.callback(), false, 1);
    assert!(rec.updates().is_empty());

    node.put_with(1, WriteOptions::at(START)).await.unwrap();
    assert_eq!(rec.values(), vec![Some(leaf(1))]);
}

#[tokio::test]
async fn test_repeated_write_notifies_once() {
    let adapters = vec![MemoryAdapter::new(), MemoryAdapter::new()];
    let node = node_over("x", &adapters);
    let rec = Recorder::new();
    let _sub = node.on(rec.callback(), false, 1);

    node.put_with("v", WriteOptions::at(START)).await.unwrap();
    node.put_with("v", WriteOptions::at(START)).await.unwrap();

    assert_eq!(rec.values(), vec![Some(leaf("v"))]);
}

#[tokio::test]
async fn test_replicas_merge_monotonically() {
    // One replica holds the older tie loser, the other the winner
    let apple = MemoryAdapter::new();
    let banana = MemoryAdapter::new();
    node_over("fruit", std::slice::from_ref(&apple))
        .put_with("apple", WriteOptions::at(10))
        .await
        .unwrap();
    node_over("fruit", std::slice::from_ref(&banana))
        .put_with("banana", WriteOptions::at(10))
        .await
        .unwrap();

    let rec = Recorder::new();
    let _sub = node_over("fruit", &[apple.clone(), banana.clone()]).on(rec.callback(), false, 1);
    assert_eq!(rec.values(), vec![Some(leaf("apple")), Some(leaf("banana"))]);

    let rec = Recorder::new();
    let _sub = node_over("fruit", &[banana, apple]).on(rec.callback(), false, 1);
    assert_eq!(rec.values(), vec![Some(leaf("banana"))]);
}

#[tokio::test]
async fn test_directory_reads_as_marker_without_recursion() {
    let (settings, _) = memory_node("settings");
    settings
        .put_with(json!({"theme": "dark", "fontSize": 14}), WriteOptions::at(START))
        .await
        .unwrap();

    let dir = Recorder::new();
    let _dir_sub = settings.on(dir.callback(), false, 1);
    let theme = Recorder::new();
    let _theme_sub = settings.get("theme").on(theme.callback(), false, 1);

    assert_eq!(dir.values(), vec![Some(NodeValue::Directory)]);
    assert_eq!(dir.paths(), vec!["settings"]);
    assert_eq!(theme.values(), vec![Some(leaf("dark"))]);
}

#[tokio::test]
async fn test_once_flag_stops_after_first_delivery() {
    let (node, _) = memory_node("x");
    node.put_with(1, WriteOptions::at(1)).await.unwrap();

    let rec = Recorder::new();
    let sub = node.on(rec.callback(), true, 1);
    assert!(!sub.is_active());

    node.put_with(2, WriteOptions::at(2)).await.unwrap();
    assert_eq!(rec.values(), vec![Some(leaf(1))]);
}

#[tokio::test]
async fn test_unsubscribe_stops_callbacks_and_is_idempotent() {
    let (node, _) = memory_node("x");
    let rec = Recorder::new();
    let sub = node.on(rec.callback(), false, 1);

    node.put_with(1, WriteOptions::at(1)).await.unwrap();
    sub.unsubscribe();
    sub.unsubscribe();
    node.put_with(2, WriteOptions::at(2)).await.unwrap();

    assert_eq!(rec.values(), vec![Some(leaf(1))]);
}

#[tokio::test]
async fn test_callback_can_unsubscribe_itself() {
    let (node, _) = memory_node("x");
    let rec = Recorder::new();
    let inner = rec.callback();
    let _sub = node.on(
        callback(move |update, sub| {
            inner(update, sub);
            sub.unsubscribe();
        }),
        false,
        2,
    );

    node.put_with(1, WriteOptions::at(1)).await.unwrap();
    node.put_with(2, WriteOptions::at(2)).await.unwrap();
    assert_eq!(rec.values(), vec![Some(leaf(1))]);
}

#[tokio::test]
async fn test_recursive_subscription_reports_children() {
    let (settings, _) = memory_node("settings");
    settings
        .put_with(json!({"theme": "dark", "fontSize": 14}), WriteOptions::at(START))
        .await
        .unwrap();

    let rec = Recorder::new();
    let _sub = settings.on(rec.callback(), false, 2);

    assert_eq!(rec.updates()[0].path, "settings");
    assert_eq!(rec.updates()[0].value, Some(NodeValue::Directory));
    assert_eq!(rec.values_at("settings/theme"), vec![leaf("dark")]);
    assert_eq!(rec.values_at("settings/fontSize"), vec![leaf(14)]);
    assert!(
        rec.values_at("settings")
            .iter()
            .all(NodeValue::is_directory)
    );

    // Children added later are picked up
    settings
        .get("language")
        .put_with("en", WriteOptions::at(START + 1))
        .await
        .unwrap();
    assert_eq!(rec.values_at("settings/language"), vec![leaf("en")]);

    // And changes to existing children are reported
    settings
        .get("theme")
        .put_with("light", WriteOptions::at(START + 2))
        .await
        .unwrap();
    assert_eq!(
        rec.values_at("settings/theme"),
        vec![leaf("dark"), leaf("light")]
    );
}

#[tokio::test]
async fn test_depth_one_ignores_children() {
    let (settings, _) = memory_node("settings");
    let rec = Recorder::new();
    let _sub = settings.on(rec.callback(), false, 1);

    settings
        .get("theme")
        .put_with("dark", WriteOptions::at(START))
        .await
        .unwrap();
    assert!(rec.updates().is_empty());
}

#[tokio::test]
async fn test_recursion_stops_at_depth() {
    let (root, _) = memory_node("root");
    root.put_with(json!({"a": {"b": {"c": 1}}}), WriteOptions::at(START))
        .await
        .unwrap();

    let rec = Recorder::new();
    let _sub = root.on(rec.callback(), false, 3);
    assert_eq!(rec.paths(), vec!["root", "root/a", "root/a/b"]);
}

#[tokio::test]
async fn test_unsubscribe_cascades_to_children() {
    let (settings, _) = memory_node("settings");
    settings
        .put_with(json!({"theme": "dark"}), WriteOptions::at(START))
        .await
        .unwrap();

    let rec = Recorder::new();
    let sub = settings.on(rec.callback(), false, 3);
    let before = rec.updates().len();
    sub.unsubscribe();

    settings
        .get("theme")
        .put_with("light", WriteOptions::at(START + 1))
        .await
        .unwrap();
    settings
        .get("fresh")
        .put_with(json!({"deep": 1}), WriteOptions::at(START + 1))
        .await
        .unwrap();
    assert_eq!(rec.updates().len(), before);
}

#[tokio::test]
async fn test_child_may_arrive_before_parent_marker() {
    let (root, _) = memory_node("root");
    let rec = Recorder::new();
    let _sub = root.on(rec.callback(), false, 2);

    // Only the leaf is written; `root/chats` holds no marker of its own
    root.get("chats")
        .get("abc")
        .put_with("hi", WriteOptions::at(START))
        .await
        .unwrap();

    assert_eq!(rec.values_at("root/chats"), vec![NodeValue::Directory]);
    assert!(rec.values_at("root/chats/abc").is_empty());
    assert_eq!(rec.values_at("root"), vec![NodeValue::Directory]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_stay_monotonic() {
    let adapters: Vec<MemoryAdapter> = (0..4).map(|_| MemoryAdapter::new()).collect();
    let node = node_over("x", &adapters);

    let rec = Recorder::new();
    let _sub = node.on(rec.callback(), false, 1);

    // Each replica receives a disjoint, descending run of timestamps
    let mut tasks = tokio::task::JoinSet::new();
    for (offset, adapter) in adapters.into_iter().enumerate() {
        tasks.spawn(async move {
            for step in (0..200u64).rev() {
                let updated_at = step * 4 + offset as u64 + 1;
                adapter
                    .set("x", TimestampedValue::new(leaf(updated_at), updated_at))
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    let stamps: Vec<u64> = rec
        .updates()
        .iter()
        .map(|u| u.updated_at.unwrap())
        .collect();
    assert!(!stamps.is_empty());
    assert!(
        stamps.windows(2).all(|pair| pair[0] < pair[1]),
        "delivered out of order: {stamps:?}"
    );
    assert_eq!(stamps.last(), Some(&800));
}
