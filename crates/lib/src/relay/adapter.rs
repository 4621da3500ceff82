//! [`Adapter`] implementation over a [`RelayClient`].

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{APP_DATA_KIND, Event, EventCallback, EventTemplate, Filter, RelayClient, author_path};
use crate::{
    Result,
    adapter::{Adapter, Callback, Update},
    clock::{Clock, SystemClock},
    config::RelayConfig,
    path,
    resolver::{Version, resolve},
    subscription::{Subscription, lock},
    value::{NodeValue, TimestampedValue},
};

/// Validates received events against the adapter's kind and author set.
///
/// Cloned into every subscription callback.
#[derive(Clone)]
struct EventDecoder {
    authors: Arc<[String]>,
    kind: u16,
    clock: Arc<dyn Clock>,
}

impl EventDecoder {
    /// An empty author set accepts every author, as an empty filter does.
    fn accepts_author(&self, pubkey: &str) -> bool {
        self.authors.is_empty() || self.authors.iter().any(|a| a == pubkey)
    }

    /// Returns the event's path and decoded value, or `None` if the event
    /// must be ignored. Relays are untrusted, so filter constraints are
    /// rechecked here.
    fn decode(&self, event: &Event) -> Option<(String, TimestampedValue)> {
        if event.kind != self.kind
            || event.created_at == 0
            || !self.accepts_author(&event.pubkey)
        {
            return None;
        }
        let Some(path) = event.path() else {
            debug!(id = %event.id, "Ignoring event without a path tag");
            return None;
        };
        if let Err(e) = event.verify() {
            warn!(id = %event.id, error = %e, "Discarding unverifiable event");
            return None;
        }
        if event.is_expired(self.clock.now_secs()) {
            return None;
        }
        let value = match NodeValue::from_canonical(&event.content) {
            Ok(value) => value,
            Err(e) => {
                warn!(id = %event.id, path = %path, error = %e, "Discarding event with unparseable content");
                return None;
            }
        };
        let mut stamped = TimestampedValue::new(value, event.created_at * 1000);
        stamped.expires_at = event.expiration().map(|secs| secs * 1000);
        Some((path.to_string(), stamped))
    }
}

/// An update reported under `author`'s identity path.
fn authored(author: &str, path: &str, value: NodeValue, updated_at: u64) -> Update {
    Update {
        value: Some(value),
        path: author_path(author, path),
        updated_at: Some(updated_at),
        author: Some(author.to_string()),
    }
}

/// Stores and syncs tree values as replaceable relay events.
///
/// Every value is reported under `author + path`, so readers see each
/// author's contribution separately. Listing subscribes to every event of the
/// configured kind and authors and filters children client-side, which does
/// not scale to large trees.
pub struct RelayAdapter {
    client: Arc<dyn RelayClient>,
    decoder: EventDecoder,
    /// Last value written through this adapter, per path
    seen: Mutex<HashMap<String, TimestampedValue>>,
}

impl RelayAdapter {
    /// Creates an adapter reading values from `authors` (hex public keys).
    ///
    /// With no authors, values from every author are read.
    pub fn new(client: Arc<dyn RelayClient>, authors: Vec<String>) -> Self {
        Self {
            client,
            decoder: EventDecoder {
                authors: authors.into(),
                kind: APP_DATA_KIND,
                clock: Arc::new(SystemClock),
            },
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(client: Arc<dyn RelayClient>, config: &RelayConfig) -> Self {
        Self::new(client, config.authors.clone()).with_kind(config.kind)
    }

    /// Uses a different event kind for reads and writes.
    pub fn with_kind(mut self, kind: u16) -> Self {
        self.decoder.kind = kind;
        self
    }

    /// Judges `expiration` tags against `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.decoder.clock = clock;
        self
    }

    pub fn authors(&self) -> &[String] {
        &self.decoder.authors
    }

    pub fn kind(&self) -> u16 {
        self.decoder.kind
    }

    fn filter(&self) -> Filter {
        Filter::new()
            .authors(self.decoder.authors.iter().cloned())
            .kind(self.decoder.kind)
    }
}

#[async_trait]
impl Adapter for RelayAdapter {
    fn get(&self, path: &str, callback: Callback) -> Subscription {
        let handle = Subscription::new();
        let delivered = Arc::new(AtomicBool::new(false));

        let on_event: EventCallback = {
            let decoder = self.decoder.clone();
            let wanted = path.to_string();
            let callback = callback.clone();
            let handle = handle.clone();
            let delivered = delivered.clone();
            Arc::new(move |event, _| {
                let Some((event_path, stamped)) = decoder.decode(&event) else {
                    return;
                };
                if event_path != wanted || !handle.is_active() {
                    return;
                }
                delivered.store(true, Ordering::Release);
                let updated_at = stamped.updated_at.unwrap_or_default();
                callback(
                    authored(&event.pubkey, &wanted, stamped.value, updated_at),
                    &handle,
                );
            })
        };

        let inner = self.client.subscribe(self.filter().path(path), on_event);
        handle.add_child(inner);

        // Stored events have been replayed by now.
        if !delivered.load(Ordering::Acquire) && handle.is_active() {
            callback(Update::absent(path), &handle);
        }
        handle
    }

    async fn set(&self, path: &str, value: TimestampedValue) -> Result<()> {
        let updated_at = value.require_updated_at(path)?;

        let previous = {
            let mut seen = lock(&self.seen);
            let previous = seen.get(path).cloned();
            if let Some(current) = &previous
                && resolve(Version::of(&value), Some(Version::of(current))).is_stale()
            {
                debug!(path = %path, updated_at, "Dropping stale write");
                return Ok(());
            }
            seen.insert(path.to_string(), value.clone());
            previous
        };

        let mut template = EventTemplate::for_path(
            self.decoder.kind,
            path,
            updated_at / 1000,
            value.value.to_canonical(),
        );
        if let Some(expires_at) = value.expires_at {
            template = template.expiring_at(expires_at / 1000);
        }

        debug!(path = %path, updated_at, "Publishing value");
        if let Err(e) = self.client.publish(template).await {
            // Forget the write so a retry is not dropped as stale.
            let mut seen = lock(&self.seen);
            if seen.get(path) == Some(&value) {
                match previous {
                    Some(previous) => {
                        seen.insert(path.to_string(), previous);
                    }
                    None => {
                        seen.remove(path);
                    }
                }
            }
            warn!(path = %path, error = %e, "Failed to publish value");
        }
        Ok(())
    }

    fn list(&self, path: &str, callback: Callback) -> Subscription {
        let handle = Subscription::new();

        let on_event: EventCallback = {
            let decoder = self.decoder.clone();
            let parent = path.to_string();
            let handle = handle.clone();
            // Identity paths of children that have events of their own
            let explicit: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
            Arc::new(move |event, _| {
                let Some((event_path, stamped)) = decoder.decode(&event) else {
                    return;
                };
                let Some(child) = path::direct_child_of(&parent, &event_path) else {
                    return;
                };
                if !handle.is_active() {
                    return;
                }
                let updated_at = stamped.updated_at.unwrap_or_default();
                let update = if child == event_path {
                    lock(&explicit).insert(author_path(&event.pubkey, child));
                    authored(&event.pubkey, child, stamped.value, updated_at)
                } else if lock(&explicit).contains(&author_path(&event.pubkey, child)) {
                    return;
                } else {
                    authored(&event.pubkey, child, NodeValue::Directory, updated_at)
                };
                callback(update, &handle);
            })
        };

        let inner = self.client.subscribe(self.filter(), on_event);
        handle.add_child(inner);
        handle
    }
}

impl std::fmt::Debug for RelayAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayAdapter")
            .field("authors", &self.decoder.authors)
            .field("kind", &self.decoder.kind)
            .finish_non_exhaustive()
    }
}
