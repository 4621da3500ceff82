//! Adapter implementations for Treelike storage and transports
//!
//! This module provides the core `Adapter` trait and the reference adapters
//! built on it (in-memory, persistent, same-device broadcast). The relay
//! adapter lives in [`crate::relay`].
//!
//! The `Adapter` trait defines a uniform get/set/list protocol over paths.
//! This allows the node layer to merge any number of backends without knowing
//! how each one stores or transmits values.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Result,
    subscription::Subscription,
    value::{NodeValue, TimestampedValue},
};

mod broadcast;
mod errors;
mod memory;
mod persistent;

pub use broadcast::{BroadcastAdapter, BroadcastHub};
pub use errors::AdapterError;
pub use memory::MemoryAdapter;
pub use persistent::{JsonFileStorage, PersistentAdapter, Storage};

/// One delivery from an adapter: `(value, path, updated_at)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// `None` when the adapter holds nothing for the path.
    pub value: Option<NodeValue>,
    /// The identity path of the value. Adapters that separate values per
    /// author prefix the logical path with the author's key.
    pub path: String,
    pub updated_at: Option<u64>,
    /// The author prefix carried in `path`, if any.
    pub author: Option<String>,
}

impl Update {
    /// A delivery reporting that nothing is stored at `path`.
    pub fn absent(path: impl Into<String>) -> Self {
        Self {
            value: None,
            path: path.into(),
            updated_at: None,
            author: None,
        }
    }

    pub fn stored(path: impl Into<String>, stamped: &TimestampedValue) -> Self {
        Self {
            value: Some(stamped.value.clone()),
            path: path.into(),
            updated_at: stamped.updated_at,
            author: None,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }

    /// The tree path with any author prefix removed.
    pub fn logical_path(&self) -> &str {
        match &self.author {
            Some(author) => self.path.strip_prefix(author.as_str()).unwrap_or(&self.path),
            None => &self.path,
        }
    }
}

/// Callback invoked for every delivery, together with the handle of the
/// subscription that produced it so the callback can cancel itself.
pub type Callback = Arc<dyn Fn(Update, &Subscription) + Send + Sync>;

/// Wraps a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(Update, &Subscription) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Adapter trait abstracting a storage or transport backend.
///
/// `get` and `list` are live subscriptions: they report what the adapter
/// knows now and keep reporting changes until the returned handle is
/// unsubscribed. Implementations must be `Send` and `Sync` so a single
/// adapter can be shared by every node derived from the same root.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Subscribes to the value at exactly `path`.
    ///
    /// The callback runs once, synchronously or soon, with the current value
    /// (possibly absent) and again whenever the adapter's own state for
    /// `path` changes.
    fn get(&self, path: &str, callback: Callback) -> Subscription;

    /// Records a value for `path`.
    ///
    /// # Errors
    /// `AdapterError::InvalidValue` if `value.updated_at` is missing.
    async fn set(&self, path: &str, value: TimestampedValue) -> Result<()>;

    /// Subscribes to the direct children of `path`.
    ///
    /// The callback runs once per existing child and again for every child
    /// that appears or changes later. Deeper descendants are never reported
    /// themselves; a descendant whose direct-child ancestor has no stored
    /// value of its own surfaces that ancestor as the directory marker.
    fn list(&self, path: &str, callback: Callback) -> Subscription;
}
