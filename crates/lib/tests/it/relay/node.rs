use std::sync::Arc;

use serde_json::json;
use treelike::{
    Adapter, Node, NodeValue, WriteOptions,
    relay::{LocalRelay, RelayAdapter, split_author_path},
    state::public_state,
};

use crate::helpers::{Recorder, START, frozen_clock, leaf, relay_author};

#[tokio::test]
async fn test_public_state_round_trip() {
    let relay = LocalRelay::new();
    let (client, author) = relay_author(&relay);
    let (reader, _) = relay_author(&relay);

    let writer = public_state(client, vec![author.clone()]);
    assert_eq!(writer.path(), "");
    writer
        .get("profile")
        .put_with(json!({"name": "alice", "age": 3}), WriteOptions::at(START))
        .await
        .unwrap();

    let profile = public_state(reader, vec![author]).get("profile");
    assert_eq!(profile.once(false).await, Some(NodeValue::Directory));
    assert_eq!(profile.get("name").once(false).await, Some(leaf("alice")));
    assert_eq!(relay.events().len(), 3);
}

#[tokio::test]
async fn test_recursive_subscription_over_relay() {
    let relay = LocalRelay::new();
    let (client, author) = relay_author(&relay);
    let root = public_state(client, vec![author]);

    let rec = Recorder::new();
    let _sub = root.get("root").on(rec.callback(), false, 3);

    root.get("root/chats/someChatId/latest")
        .put_with("hi", WriteOptions::at(START))
        .await
        .unwrap();

    let logical: Vec<String> = rec
        .paths()
        .iter()
        .filter_map(|p| split_author_path(p).map(|(_, path)| path.to_string()))
        .collect();
    assert!(logical.contains(&"root/chats".to_string()));
    assert!(logical.contains(&"root/chats/someChatId".to_string()));
    assert!(!logical.contains(&"root/chats/someChatId/latest".to_string()));
}

#[tokio::test]
async fn test_equal_seconds_converge_across_authors() {
    let relay = LocalRelay::new();
    let (alice, alice_key) = relay_author(&relay);
    let (bob, bob_key) = relay_author(&relay);
    let authors = vec![alice_key, bob_key];

    public_state(alice, authors.clone())
        .get("fruit")
        .put_with("apple", WriteOptions::at(START + 300))
        .await
        .unwrap();
    public_state(bob, authors.clone())
        .get("fruit")
        .put_with("banana", WriteOptions::at(START + 700))
        .await
        .unwrap();

    let (reader, _) = relay_author(&relay);
    let rec = Recorder::new();
    let _sub = public_state(reader, authors)
        .get("fruit")
        .on(rec.callback(), false, 1);
    assert_eq!(rec.last().unwrap().value, Some(leaf("banana")));
}

#[tokio::test]
async fn test_grouped_subscription_tracks_each_author() {
    let relay = LocalRelay::new();
    let (alice, alice_key) = relay_author(&relay);
    let (bob, bob_key) = relay_author(&relay);
    let authors = vec![alice_key.clone(), bob_key.clone()];
    let (reader, _) = relay_author(&relay);
    let group = public_state(reader, authors.clone()).get("groups/g/name");

    let merged = Recorder::new();
    let _merged_sub = group.on(merged.callback(), false, 1);
    let grouped = Recorder::new();
    let _grouped_sub = group.on_grouped(grouped.callback(), 1);

    public_state(alice, authors.clone())
        .get("groups/g/name")
        .put_with("A", WriteOptions::at(START + 2_000))
        .await
        .unwrap();
    public_state(bob, authors)
        .get("groups/g/name")
        .put_with("B", WriteOptions::at(START + 1_000))
        .await
        .unwrap();

    assert_eq!(merged.values(), vec![Some(leaf("A"))]);
    assert_eq!(
        grouped.values_at(&format!("{alice_key}groups/g/name")),
        vec![leaf("A")]
    );
    assert_eq!(
        grouped.values_at(&format!("{bob_key}groups/g/name")),
        vec![leaf("B")]
    );
}

#[tokio::test]
async fn test_outage_is_absorbed_and_retry_succeeds() {
    let relay = LocalRelay::new();
    let (client, author) = relay_author(&relay);
    let node = public_state(client, vec![author]).get("status");

    relay.set_online(false);
    node.put_with("online", WriteOptions::at(START))
        .await
        .unwrap();
    assert!(relay.events().is_empty());

    relay.set_online(true);
    node.put_with("online", WriteOptions::at(START))
        .await
        .unwrap();
    assert_eq!(relay.events().len(), 1);
    assert_eq!(node.once(false).await, Some(leaf("online")));
}

#[tokio::test]
async fn test_expired_values_disappear() {
    let clock = frozen_clock();
    let relay = LocalRelay::with_clock(clock.clone());
    let (client, author) = relay_author(&relay);
    let adapter = RelayAdapter::new(client, vec![author]).with_clock(clock.clone());
    let node = Node::new("", vec![Arc::new(adapter) as Arc<dyn Adapter>])
        .with_clock(clock.clone())
        .get("invite");

    node.put_with("code", WriteOptions::at(START).expiring_at(START + 60_000))
        .await
        .unwrap();
    assert_eq!(node.once(true).await, Some(leaf("code")));
    assert_eq!(
        relay.events()[0].expiration(),
        Some((START + 60_000) / 1000)
    );

    clock.set(START + 60_000);
    assert!(relay.events().is_empty());
    assert_eq!(node.once(true).await, None);
}
