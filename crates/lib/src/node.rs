//! Nodes: handles onto one path of the tree.
//!
//! A [`Node`] owns no state of its own. Writes fan out to every adapter and
//! reads subscribe to every adapter, merging what comes back through the
//! resolver so that a subscriber never sees a value older than one it was
//! already given.
//!
//! Recursive subscriptions are a tree of listeners, one per visited path.
//! Each listener owns a [`Subscription`] that is a child of its parent's, so
//! unsubscribing the root tears down every adapter registration below it.
//!
//! When a new child is discovered under a recursive subscription, the parent
//! path is reported again with the directory marker. A nested write can
//! therefore notify the same directory more than once.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use serde_json::Value;
use tokio::{sync::oneshot, task::JoinSet};
use tracing::{debug, warn};

use crate::{
    Result,
    adapter::{Adapter, Callback, Update, callback},
    clock::{Clock, SystemClock},
    path,
    relay::author_path,
    resolver::{Version, resolve},
    subscription::{Subscription, lock},
    value::{NodeValue, TimestampedValue},
};

/// Explicit stamps for a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Epoch milliseconds; the node's clock is used when unset.
    pub updated_at: Option<u64>,
    /// Epoch milliseconds after which the value reads as absent.
    pub expires_at: Option<u64>,
}

impl WriteOptions {
    pub fn at(updated_at: u64) -> Self {
        Self {
            updated_at: Some(updated_at),
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// A handle bound to one path and a fixed list of adapters.
///
/// Cloning is cheap. Child nodes share the parent's adapters.
#[derive(Clone)]
pub struct Node {
    path: String,
    adapters: Arc<[Arc<dyn Adapter>]>,
    clock: Arc<dyn Clock>,
}

impl Node {
    pub fn new(path: impl Into<String>, adapters: Vec<Arc<dyn Adapter>>) -> Self {
        Self {
            path: path.into(),
            adapters: adapters.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamps writes using `clock` instead of system time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The last segment of the path.
    pub fn id(&self) -> &str {
        path::last_segment(&self.path)
    }

    pub fn adapters(&self) -> &[Arc<dyn Adapter>] {
        &self.adapters
    }

    /// The node at `child` below this one. No I/O happens.
    pub fn get(&self, child: &str) -> Node {
        Node {
            path: path::join(&self.path, child),
            adapters: Arc::clone(&self.adapters),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Writes `value` to every adapter, stamped with the current time.
    ///
    /// Objects are decomposed: each property is written to its child path,
    /// then this path is set to the directory marker.
    ///
    /// # Errors
    /// The first error returned by any adapter.
    pub async fn put(&self, value: impl Into<Value>) -> Result<()> {
        self.put_with(value, WriteOptions::default()).await
    }

    /// Like [`Node::put`], with explicit stamps.
    pub async fn put_with(&self, value: impl Into<Value>, options: WriteOptions) -> Result<()> {
        let updated_at = options
            .updated_at
            .unwrap_or_else(|| self.clock.now_millis());

        let mut writes = Vec::new();
        decompose(&self.path, value.into(), &mut writes);
        debug!(path = %self.path, updated_at, writes = writes.len(), "Putting value");

        for (path, value) in writes {
            let mut stamped = TimestampedValue::new(value, updated_at);
            stamped.expires_at = options.expires_at;
            self.set_all(&path, stamped).await?;
        }
        Ok(())
    }

    /// Sets `value` on every adapter concurrently and waits for all of them.
    async fn set_all(&self, path: &str, value: TimestampedValue) -> Result<()> {
        let mut tasks = JoinSet::new();
        for adapter in self.adapters.iter() {
            let adapter = Arc::clone(adapter);
            let path = path.to_string();
            let value = value.clone();
            tasks.spawn(async move { adapter.set(&path, value).await });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => warn!(path = %path, error = %e, "Adapter write was cancelled"),
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Subscribes to this path.
    ///
    /// `callback` runs for every update the resolver accepts. With
    /// `recursion_depth > 1` every child (found through `list`) is subscribed
    /// at `recursion_depth - 1`, and this path is reported with the directory
    /// marker whenever a new child is found. With `once`, the subscription
    /// ends after the first delivery.
    pub fn on(&self, callback: Callback, once: bool, recursion_depth: usize) -> Subscription {
        let root = self.root(callback, once, Scope::Merged, None);
        root.attach(recursion_depth);
        root.handle.clone()
    }

    /// Like [`Node::on`], but resolves every delivered path separately.
    ///
    /// Adapters that report values per author deliver them under distinct
    /// paths, so each author's latest value is reported rather than only
    /// the overall winner.
    pub fn on_grouped(&self, callback: Callback, recursion_depth: usize) -> Subscription {
        let root = self.root(callback, false, Scope::PerPath, None);
        root.attach(recursion_depth);
        root.handle.clone()
    }

    /// Subscribes to every current and future child, each at `recursion_depth`.
    ///
    /// Children reported by several adapters are subscribed once. This path
    /// itself is not reported.
    pub fn for_each(&self, callback: Callback, recursion_depth: usize) -> Subscription {
        let root = self.root(callback, false, Scope::Merged, None);
        root.watch_children(recursion_depth, false);
        root.handle.clone()
    }

    /// Waits for the first value of this path.
    ///
    /// With `return_if_undefined`, resolves to `None` once every adapter has
    /// reported that it holds nothing. Otherwise waits until a value is
    /// written; callers wanting a deadline should wrap this in a timeout.
    pub async fn once(&self, return_if_undefined: bool) -> Option<NodeValue> {
        self.once_update(return_if_undefined)
            .await
            .and_then(|update| update.value)
    }

    /// Like [`Node::once`], returning the whole update including its stamp
    /// and the path it was reported under.
    pub async fn once_update(&self, return_if_undefined: bool) -> Option<Update> {
        if return_if_undefined && self.adapters.is_empty() {
            return None;
        }

        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let resolve_with = move |update: Option<Update>| {
            if let Some(tx) = lock(&tx).take() {
                let _ = tx.send(update);
            }
        };

        let on_value = {
            let resolve_with = resolve_with.clone();
            callback(move |update, _| resolve_with(Some(update)))
        };
        let quorum = return_if_undefined.then(|| AbsentQuorum {
            needed: self.adapters.len(),
            reported: Mutex::new(HashSet::new()),
            on_reached: Box::new(move || resolve_with(None)),
        });

        let root = self.root(on_value, true, Scope::Merged, quorum);
        let _guard = UnsubscribeOnDrop(root.handle.clone());
        root.attach(1);
        rx.await.ok().flatten()
    }

    fn root(
        &self,
        callback: Callback,
        once: bool,
        scope: Scope,
        absent_quorum: Option<AbsentQuorum>,
    ) -> Arc<Listener> {
        let handle = Subscription::new();
        let shared = Arc::new(Shared {
            callback,
            root: handle.clone(),
            adapters: Arc::clone(&self.adapters),
            once,
            fired: AtomicBool::new(false),
            scope,
            absent_quorum,
        });
        Listener::new(shared, self.path.clone(), handle)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.path)
            .field("adapters", &self.adapters.len())
            .finish()
    }
}

/// Flattens `value` into writes, children before their directory marker.
fn decompose(path: &str, value: Value, out: &mut Vec<(String, NodeValue)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                decompose(&path::join(path, &key), child, out);
            }
            out.push((path.to_string(), NodeValue::Directory));
        }
        leaf => out.push((path.to_string(), NodeValue::Leaf(leaf))),
    }
}

struct UnsubscribeOnDrop(Subscription);

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}

/// What the resolver compares each update against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Everything delivered for one node path.
    Merged,
    /// Each delivered (identity) path on its own.
    PerPath,
}

/// Tracks which adapters have reported absence for a `once` read.
struct AbsentQuorum {
    needed: usize,
    reported: Mutex<HashSet<usize>>,
    on_reached: Box<dyn Fn() + Send + Sync>,
}

impl AbsentQuorum {
    /// Records adapter `index` as empty; true once every adapter has.
    fn report(&self, index: usize) -> bool {
        let mut reported = lock(&self.reported);
        reported.insert(index);
        reported.len() >= self.needed
    }
}

/// State shared by every listener of one top-level subscription.
struct Shared {
    callback: Callback,
    root: Subscription,
    adapters: Arc<[Arc<dyn Adapter>]>,
    once: bool,
    fired: AtomicBool,
    scope: Scope,
    absent_quorum: Option<AbsentQuorum>,
}

impl Shared {
    fn emit(&self, update: Update) {
        if !self.root.is_active() {
            return;
        }
        if self.once && self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        (self.callback)(update, &self.root);
        if self.once {
            self.root.unsubscribe();
        }
    }
}

/// Subscription state for one path of a (possibly recursive) subscription.
struct Listener {
    shared: Arc<Shared>,
    path: String,
    handle: Subscription,
    /// Last accepted update, keyed by scope
    seen: Mutex<HashMap<String, Update>>,
    /// Held from acceptance through emission so concurrent deliveries reach
    /// the callback in resolver order
    emitting: Mutex<()>,
    /// Child listeners keyed by logical path
    children: Mutex<HashMap<String, Arc<Listener>>>,
}

impl Listener {
    fn new(shared: Arc<Shared>, path: String, handle: Subscription) -> Arc<Self> {
        Arc::new(Self {
            shared,
            path,
            handle,
            seen: Mutex::new(HashMap::new()),
            emitting: Mutex::new(()),
            children: Mutex::new(HashMap::new()),
        })
    }

    fn scope_key(&self, identity: &str) -> String {
        match self.shared.scope {
            Scope::Merged => String::new(),
            Scope::PerPath => identity.to_string(),
        }
    }

    /// Subscribes to this path on every adapter, and to children below
    /// `depth` 1.
    fn attach(self: &Arc<Self>, depth: usize) {
        for (index, adapter) in self.shared.adapters.iter().enumerate() {
            if !self.handle.is_active() {
                return;
            }
            let listener = Arc::clone(self);
            let sub = adapter.get(
                &self.path,
                callback(move |update, _| listener.deliver(index, update)),
            );
            self.handle.add_child(sub);
        }
        if depth > 1 {
            self.watch_children(depth - 1, true);
        }
    }

    /// Lists this path on every adapter, subscribing to each child found at
    /// `child_depth`.
    fn watch_children(self: &Arc<Self>, child_depth: usize, announce: bool) {
        for adapter in self.shared.adapters.iter() {
            if !self.handle.is_active() {
                return;
            }
            let listener = Arc::clone(self);
            let sub = adapter.list(
                &self.path,
                callback(move |update, _| listener.on_child(update, child_depth, announce)),
            );
            self.handle.add_child(sub);
        }
    }

    /// Handles a `get` delivery from adapter `index`.
    fn deliver(&self, index: usize, update: Update) {
        if update.is_defined() {
            self.offer(update);
            return;
        }
        if let Some(quorum) = &self.shared.absent_quorum
            && quorum.report(index)
        {
            (quorum.on_reached)();
            self.shared.root.unsubscribe();
        }
    }

    /// Runs `update` through the resolver and emits it if accepted.
    fn offer(&self, update: Update) -> bool {
        if !update.is_defined() || !self.handle.is_active() {
            return false;
        }
        let _emitting = lock(&self.emitting);
        {
            let mut seen = lock(&self.seen);
            let key = self.scope_key(&update.path);
            let current = seen.get(&key).map(Version::of_update);
            if resolve(Version::of_update(&update), current).is_stale() {
                debug!(path = %update.path, updated_at = ?update.updated_at, "Ignoring stale update");
                return false;
            }
            seen.insert(key, update.clone());
        }
        self.shared.emit(update);
        true
    }

    /// Handles a `list` delivery for this path.
    fn on_child(self: &Arc<Self>, update: Update, child_depth: usize, announce: bool) {
        let child_path = update.logical_path().to_string();
        if !path::is_direct_child(&self.path, &child_path) || !self.handle.is_active() {
            return;
        }

        let (child, discovered) = {
            let mut children = lock(&self.children);
            match children.get(&child_path) {
                Some(child) => (Arc::clone(child), false),
                None => {
                    let handle = Subscription::new();
                    self.handle.add_child(handle.clone());
                    let child = Listener::new(self.shared.clone(), child_path.clone(), handle);
                    children.insert(child_path, Arc::clone(&child));
                    (child, true)
                }
            }
        };

        if discovered && announce {
            self.announce_child(&update);
        }
        child.offer(update);
        if discovered {
            child.attach(child_depth);
        }
    }

    /// Reports this path as a directory after a new child was found.
    ///
    /// Skipped if a leaf was already reported here, since the marker would
    /// be older than it.
    fn announce_child(&self, child: &Update) {
        let identity = match &child.author {
            Some(author) => author_path(author, &self.path),
            None => self.path.clone(),
        };
        let _emitting = lock(&self.emitting);
        let marker = {
            let mut seen = lock(&self.seen);
            let key = self.scope_key(&identity);
            match seen.get(&key) {
                Some(current) if current.value.as_ref().is_some_and(NodeValue::is_directory) => {
                    current.clone()
                }
                Some(_) => return,
                None => {
                    let marker = Update {
                        value: Some(NodeValue::Directory),
                        path: identity,
                        updated_at: child.updated_at,
                        author: child.author.clone(),
                    };
                    seen.insert(key, marker.clone());
                    marker
                }
            }
        };
        self.shared.emit(marker);
    }
}
