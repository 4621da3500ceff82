//! In-process relay.
//!
//! [`LocalRelay`] keeps the latest event per `(author, kind, d)` and fans
//! events out to matching subscriptions. It honours `expiration` tags and can
//! be taken offline to simulate an outage. [`LocalRelayClient`] is the
//! [`RelayClient`] that signs and publishes to it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use async_trait::async_trait;
use tracing::debug;

use super::{Event, EventCallback, EventTemplate, Filter, Keys, RelayClient, RelayError};
use crate::{
    Result,
    clock::{Clock, SystemClock},
    subscription::{Subscription, lock},
};

/// Replaceable event address: author, kind and `d` tag.
type Address = (String, u16, String);

struct Subscriber {
    id: u64,
    filter: Filter,
    callback: EventCallback,
    handle: Subscription,
}

struct RelayState {
    events: HashMap<Address, Event>,
    subscribers: Vec<Subscriber>,
    online: bool,
    next_id: u64,
}

impl Default for RelayState {
    fn default() -> Self {
        Self {
            events: HashMap::new(),
            subscribers: Vec::new(),
            online: true,
            next_id: 0,
        }
    }
}

/// An in-memory relay. Cloning yields another handle to the same relay.
#[derive(Clone)]
pub struct LocalRelay {
    state: Arc<Mutex<RelayState>>,
    clock: Arc<dyn Clock>,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a relay that judges `expiration` tags against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState::default())),
            clock,
        }
    }

    /// Takes the relay offline or brings it back.
    ///
    /// While offline every publish fails with `TransportUnavailable`.
    pub fn set_online(&self, online: bool) {
        lock(&self.state).online = online;
    }

    pub fn is_online(&self) -> bool {
        lock(&self.state).online
    }

    /// Every stored, unexpired event, oldest first.
    pub fn events(&self) -> Vec<Event> {
        let now = self.clock.now_secs();
        let state = lock(&self.state);
        let mut events: Vec<Event> = state
            .events
            .values()
            .filter(|e| !e.is_expired(now))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        events
    }

    /// Verifies and stores `event`, forwarding it to live subscriptions.
    ///
    /// Returns `Ok(false)` if the relay already holds a newer event at the
    /// same address or the event has expired.
    ///
    /// # Errors
    /// `TransportUnavailable` while offline; `InvalidEvent` or
    /// `InvalidSignature` if the event does not verify.
    pub fn accept(&self, event: Event) -> std::result::Result<bool, RelayError> {
        event.verify()?;
        let now = self.clock.now_secs();

        let deliveries: Vec<(EventCallback, Subscription)> = {
            let mut state = lock(&self.state);
            if !state.online {
                return Err(RelayError::TransportUnavailable(
                    "local relay is offline".to_string(),
                ));
            }
            if event.is_expired(now) {
                debug!(id = %event.id, "Rejecting expired event");
                return Ok(false);
            }

            let address = (
                event.pubkey.clone(),
                event.kind,
                event.path().unwrap_or_default().to_string(),
            );
            if let Some(held) = state.events.get(&address) {
                let replaces = event.created_at > held.created_at
                    || (event.created_at == held.created_at && event.id < held.id);
                if !replaces {
                    debug!(id = %event.id, held = %held.id, "Relay already holds a newer event");
                    return Ok(false);
                }
            }
            state.events.insert(address, event.clone());

            state
                .subscribers
                .iter()
                .filter(|s| s.filter.matches(&event))
                .map(|s| (s.callback.clone(), s.handle.clone()))
                .collect()
        };

        for (callback, handle) in deliveries {
            if handle.is_active() {
                callback(event.clone(), &handle);
            }
        }
        Ok(true)
    }

    /// Replays stored events matching `filter`, then forwards new ones.
    pub fn subscribe(&self, filter: Filter, callback: EventCallback) -> Subscription {
        let handle = Subscription::new();
        let stored: Vec<Event> = {
            let mut state = lock(&self.state);
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.push(Subscriber {
                id,
                filter: filter.clone(),
                callback: callback.clone(),
                handle: handle.clone(),
            });

            let relay: Weak<Mutex<RelayState>> = Arc::downgrade(&self.state);
            handle.on_unsubscribe(move || {
                if let Some(relay) = relay.upgrade() {
                    lock(&relay).subscribers.retain(|s| s.id != id);
                }
            });

            state
                .events
                .values()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect()
        };

        let now = self.clock.now_secs();
        let mut stored: Vec<Event> = stored.into_iter().filter(|e| !e.is_expired(now)).collect();
        stored.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        for event in stored {
            if !handle.is_active() {
                break;
            }
            callback(event, &handle);
        }
        handle
    }
}

impl Default for LocalRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LocalRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("LocalRelay")
            .field("events", &state.events.len())
            .field("subscribers", &state.subscribers.len())
            .field("online", &state.online)
            .finish()
    }
}

/// A [`RelayClient`] publishing to a [`LocalRelay`] as one author.
#[derive(Debug, Clone)]
pub struct LocalRelayClient {
    keys: Keys,
    relay: LocalRelay,
}

impl LocalRelayClient {
    pub fn new(keys: Keys, relay: LocalRelay) -> Self {
        Self { keys, relay }
    }

    /// The hex public key events are published under.
    pub fn public_key(&self) -> String {
        self.keys.public_key()
    }

    pub fn relay(&self) -> &LocalRelay {
        &self.relay
    }
}

#[async_trait]
impl RelayClient for LocalRelayClient {
    async fn publish(&self, template: EventTemplate) -> Result<()> {
        let event = template.sign(&self.keys);
        let id = event.id.clone();
        if !self.relay.accept(event)? {
            debug!(id = %id, "Published event was not stored");
        }
        Ok(())
    }

    fn subscribe(&self, filter: Filter, callback: EventCallback) -> Subscription {
        self.relay.subscribe(filter, callback)
    }
}
