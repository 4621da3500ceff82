use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use treelike::{
    Adapter, NodeValue, Subscription, TimestampedValue,
    relay::{
        APP_DATA_KIND, Event, EventCallback, EventTemplate, Filter, Keys, LocalRelay,
        RelayAdapter, RelayClient, RelayError, split_author_path,
    },
};

use crate::helpers::{Recorder, leaf, relay_author};

/// A relay that ignores filters and never verifies what it serves.
#[derive(Default)]
struct UntrustedRelay {
    events: Mutex<Vec<Event>>,
}

impl UntrustedRelay {
    fn inject(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl RelayClient for UntrustedRelay {
    async fn publish(&self, _template: EventTemplate) -> treelike::Result<()> {
        Err(RelayError::TransportUnavailable("read-only".to_string()).into())
    }

    fn subscribe(&self, _filter: Filter, callback: EventCallback) -> Subscription {
        let handle = Subscription::new();
        for event in self.events.lock().unwrap().clone() {
            callback(event, &handle);
        }
        handle
    }
}

fn event(keys: &Keys, path: &str, created_at: u64, content: &str) -> Event {
    EventTemplate::for_path(APP_DATA_KIND, path, created_at, content.to_string()).sign(keys)
}

#[tokio::test]
async fn test_list_surfaces_implied_child_not_descendant() {
    let relay = LocalRelay::new();
    let (client, author) = relay_author(&relay);
    let adapter = RelayAdapter::new(client, vec![author.clone()]);
    adapter
        .set(
            "root/chats/someChatId/latest",
            TimestampedValue::new(leaf("hi"), 1_000_000),
        )
        .await
        .unwrap();

    let rec = Recorder::new();
    let _sub = adapter.list("root/chats", rec.callback());

    let updates = rec.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].logical_path(), "root/chats/someChatId");
    assert_eq!(updates[0].path, format!("{author}root/chats/someChatId"));
    assert_eq!(updates[0].value, Some(NodeValue::Directory));
    assert_eq!(updates[0].updated_at, Some(1_000_000));
}

#[tokio::test]
async fn test_list_prefers_explicit_child_events() {
    let relay = LocalRelay::new();
    let (client, author) = relay_author(&relay);
    let adapter = RelayAdapter::new(client, vec![author]);
    adapter
        .set("r/a", TimestampedValue::new(leaf(1), 1_000))
        .await
        .unwrap();

    let rec = Recorder::new();
    let _sub = adapter.list("r", rec.callback());
    adapter
        .set("r/a/deep", TimestampedValue::new(leaf(2), 2_000))
        .await
        .unwrap();
    adapter
        .set("r/b", TimestampedValue::new(leaf(3), 3_000))
        .await
        .unwrap();

    let logical: Vec<String> = rec
        .updates()
        .iter()
        .map(|u| u.logical_path().to_string())
        .collect();
    assert_eq!(logical, vec!["r/a", "r/b"]);
    assert_eq!(rec.values(), vec![Some(leaf(1)), Some(leaf(3))]);
}

#[tokio::test]
async fn test_authors_are_reported_separately() {
    let relay = LocalRelay::new();
    let (alice, alice_key) = relay_author(&relay);
    let (bob, bob_key) = relay_author(&relay);
    let authors = vec![alice_key.clone(), bob_key.clone()];

    RelayAdapter::new(alice, authors.clone())
        .set("groups/g/name", TimestampedValue::new(leaf("A"), 2_000))
        .await
        .unwrap();
    RelayAdapter::new(bob, authors.clone())
        .set("groups/g/name", TimestampedValue::new(leaf("B"), 1_000))
        .await
        .unwrap();

    let (reader, _) = relay_author(&relay);
    let rec = Recorder::new();
    let _sub = RelayAdapter::new(reader, authors).get("groups/g/name", rec.callback());

    let mut seen: Vec<(String, String, NodeValue)> = rec
        .updates()
        .into_iter()
        .map(|u| {
            let (author, path) = split_author_path(&u.path).unwrap();
            (author.to_string(), path.to_string(), u.value.unwrap())
        })
        .collect();
    seen.sort_by(|a, b| a.2.to_canonical().cmp(&b.2.to_canonical()));
    assert_eq!(
        seen,
        vec![
            (alice_key, "groups/g/name".to_string(), leaf("A")),
            (bob_key, "groups/g/name".to_string(), leaf("B")),
        ]
    );
}

#[tokio::test]
async fn test_timestamps_lose_sub_second_precision() {
    let relay = LocalRelay::new();
    let (client, author) = relay_author(&relay);
    let adapter = RelayAdapter::new(client, vec![author]);
    adapter
        .set("x", TimestampedValue::new(leaf(1), 1_700_000_000_999))
        .await
        .unwrap();

    let rec = Recorder::new();
    let _sub = adapter.get("x", rec.callback());
    assert_eq!(rec.last().unwrap().updated_at, Some(1_700_000_000_000));
}

#[tokio::test]
async fn test_untrusted_events_are_discarded() {
    let alice = Keys::generate();
    let mallory = Keys::generate();
    let relay = Arc::new(UntrustedRelay::default());

    let mut tampered = event(&alice, "x", 10, "\"original\"");
    tampered.content = "\"forged\"".to_string();
    relay.inject(tampered);
    relay.inject(event(&mallory, "x", 20, "\"intruder\""));
    relay.inject(event(&alice, "y", 30, "\"other path\""));
    relay.inject(
        EventTemplate::for_path(1, "x", 40, "\"wrong kind\"".to_string()).sign(&alice),
    );
    relay.inject(event(&alice, "x", 50, "{not json"));
    relay.inject(event(&alice, "x", 0, "\"no timestamp\""));
    relay.inject(event(&alice, "x", 5, "\"genuine\""));

    let adapter = RelayAdapter::new(relay.clone(), vec![alice.public_key()]);
    let rec = Recorder::new();
    let _sub = adapter.get("x", rec.callback());
    assert_eq!(rec.values(), vec![Some(leaf("genuine"))]);

    let rec = Recorder::new();
    let _sub = adapter.list("", rec.callback());
    let logical: Vec<String> = rec
        .updates()
        .iter()
        .map(|u| u.logical_path().to_string())
        .collect();
    assert_eq!(logical, vec!["y", "x"]);
}

#[tokio::test]
async fn test_failed_publish_is_absorbed() {
    let relay = Arc::new(UntrustedRelay::default());
    let adapter = RelayAdapter::new(relay, Vec::new());
    adapter
        .set("x", TimestampedValue::new(leaf(1), 1_000))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_set_requires_updated_at() {
    let relay = LocalRelay::new();
    let (client, author) = relay_author(&relay);
    let adapter = RelayAdapter::new(client, vec![author]);
    let err = adapter
        .set(
            "x",
            TimestampedValue {
                value: leaf(1),
                updated_at: None,
                expires_at: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_invalid_value());
    assert!(relay.events().is_empty());
}
