//! In-memory adapter implementation
//!
//! A map-backed reference implementation of the [`Adapter`] contract. It is
//! also the core that the persistent and broadcast adapters layer their
//! transports over.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, Weak},
};

use async_trait::async_trait;
use tracing::debug;

use super::{Adapter, Callback, Update};
use crate::{
    Result,
    clock::{Clock, SystemClock},
    path,
    resolver::{Version, resolve},
    subscription::{Subscription, lock},
    value::{NodeValue, TimestampedValue},
};

/// A registered `get` or `list` callback.
struct Listener {
    id: u64,
    callback: Callback,
    handle: Subscription,
}

#[derive(Default)]
struct State {
    values: HashMap<String, TimestampedValue>,
    /// `get` listeners keyed by exact path
    getters: HashMap<String, Vec<Listener>>,
    /// `list` listeners keyed by parent path
    listers: HashMap<String, Vec<Listener>>,
    next_id: u64,
}

impl State {
    fn register(&mut self, by_list: bool, path: &str, callback: Callback, handle: Subscription) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let map = if by_list {
            &mut self.listers
        } else {
            &mut self.getters
        };
        map.entry(path.to_string()).or_default().push(Listener {
            id,
            callback,
            handle,
        });
        id
    }

    fn unregister(&mut self, by_list: bool, path: &str, id: u64) {
        let map = if by_list {
            &mut self.listers
        } else {
            &mut self.getters
        };
        if let Some(listeners) = map.get_mut(path) {
            listeners.retain(|l| l.id != id);
            if listeners.is_empty() {
                map.remove(path);
            }
        }
    }
}

/// A simple in-memory adapter using a `HashMap` for storage.
///
/// Writes go through the resolver, so replaying the same or an older write
/// changes nothing and notifies nobody. Cloning yields another handle to the
/// same map.
#[derive(Clone)]
pub struct MemoryAdapter {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl MemoryAdapter {
    /// Creates an empty adapter using the system clock for expiry checks.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty adapter that judges expiry against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    /// The stored value at `path`, including expired ones.
    pub fn stored(&self, path: &str) -> Option<TimestampedValue> {
        lock(&self.state).values.get(path).cloned()
    }

    /// Every stored `(path, value)` pair, sorted by path.
    pub fn entries(&self) -> Vec<(String, TimestampedValue)> {
        let state = lock(&self.state);
        let mut entries: Vec<_> = state
            .values
            .iter()
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        lock(&self.state).values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn visible(&self, stamped: &TimestampedValue, now: u64) -> Option<TimestampedValue> {
        (!stamped.is_expired(now)).then(|| stamped.clone())
    }

    /// Stores `value` at `path` if the resolver accepts it over what is held,
    /// then notifies the affected `get` and `list` listeners.
    ///
    /// Returns whether the value was accepted. Callbacks run after the
    /// internal lock is released, so they may call back into the adapter.
    pub(crate) fn apply(&self, path: &str, value: TimestampedValue) -> bool {
        let mut deliveries: Vec<(Callback, Subscription, Update)> = Vec::new();
        {
            let mut state = lock(&self.state);
            if let Some(current) = state.values.get(path)
                && resolve(Version::of(&value), Some(Version::of(current))).is_stale()
            {
                debug!(path = %path, updated_at = ?value.updated_at, "Dropping stale write");
                return false;
            }

            let now = self.clock.now_millis();
            let update = if value.is_expired(now) {
                Update::absent(path)
            } else {
                Update::stored(path, &value)
            };

            for listener in state.getters.get(path).into_iter().flatten() {
                deliveries.push((
                    listener.callback.clone(),
                    listener.handle.clone(),
                    update.clone(),
                ));
            }

            let direct_parent = path::parent(path);
            for ancestor in path::ancestors(path) {
                let Some(listeners) = state.listers.get(ancestor) else {
                    continue;
                };
                let delivery = if ancestor == direct_parent {
                    if !update.is_defined() {
                        continue;
                    }
                    update.clone()
                } else {
                    // Deeper write: surface the implied direct child unless it
                    // already holds a value of its own.
                    let Some(child) = path::direct_child_of(ancestor, path) else {
                        continue;
                    };
                    if state.values.contains_key(child) {
                        continue;
                    }
                    Update {
                        value: Some(NodeValue::Directory),
                        path: child.to_string(),
                        updated_at: value.updated_at,
                        author: None,
                    }
                };
                for listener in listeners {
                    deliveries.push((
                        listener.callback.clone(),
                        listener.handle.clone(),
                        delivery.clone(),
                    ));
                }
            }

            state.values.insert(path.to_string(), value);
        }

        for (callback, handle, update) in deliveries {
            if handle.is_active() {
                callback(update, &handle);
            }
        }
        true
    }

    /// Current direct children of `path`, including implied directories.
    fn children(&self, parent: &str) -> Vec<Update> {
        let now = self.clock.now_millis();
        let state = lock(&self.state);
        let mut children: BTreeMap<String, Update> = BTreeMap::new();
        for (stored_path, stamped) in &state.values {
            let Some(child) = path::direct_child_of(parent, stored_path) else {
                continue;
            };
            if child == stored_path {
                if let Some(visible) = self.visible(stamped, now) {
                    children.insert(child.to_string(), Update::stored(child, &visible));
                }
            } else if !state.values.contains_key(child) {
                let implied = children.entry(child.to_string()).or_insert_with(|| Update {
                    value: Some(NodeValue::Directory),
                    path: child.to_string(),
                    updated_at: None,
                    author: None,
                });
                implied.updated_at = implied.updated_at.max(stamped.updated_at);
            }
        }
        children.into_values().collect()
    }

    fn unregister_on_cancel(&self, by_list: bool, path: &str, id: u64, handle: &Subscription) {
        let state: Weak<Mutex<State>> = Arc::downgrade(&self.state);
        let path = path.to_string();
        handle.on_unsubscribe(move || {
            if let Some(state) = state.upgrade() {
                lock(&state).unregister(by_list, &path, id);
            }
        });
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("len", &self.len())
            .finish()
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn get(&self, path: &str, callback: Callback) -> Subscription {
        let handle = Subscription::new();
        let (id, current) = {
            let mut state = lock(&self.state);
            let id = state.register(false, path, callback.clone(), handle.clone());
            (id, state.values.get(path).cloned())
        };
        self.unregister_on_cancel(false, path, id, &handle);

        let now = self.clock.now_millis();
        let update = current
            .and_then(|stamped| self.visible(&stamped, now))
            .map_or_else(|| Update::absent(path), |stamped| Update::stored(path, &stamped));
        callback(update, &handle);
        handle
    }

    async fn set(&self, path: &str, value: TimestampedValue) -> Result<()> {
        value.require_updated_at(path)?;
        self.apply(path, value);
        Ok(())
    }

    fn list(&self, path: &str, callback: Callback) -> Subscription {
        let handle = Subscription::new();
        let id = lock(&self.state).register(true, path, callback.clone(), handle.clone());
        self.unregister_on_cancel(true, path, id, &handle);

        for child in self.children(path) {
            if !handle.is_active() {
                break;
            }
            callback(child, &handle);
        }
        handle
    }
}
