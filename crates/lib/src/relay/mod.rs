//! Relay network adapter.
//!
//! Maps the tree onto a flat stream of author-signed, replaceable events.
//! Each path is one event whose `d` tag is the path and whose `f` tag is the
//! parent path, so children can be listed with a single filter. Values from
//! different authors never merge: the adapter reports every value under the
//! identity path `author + path`.
//!
//! The relay connection itself is abstracted behind [`RelayClient`], so the
//! adapter works the same against a remote relay or the in-process
//! [`LocalRelay`].

use async_trait::async_trait;

use crate::{Result, subscription::Subscription};

mod adapter;
mod errors;
mod event;
pub mod keys;
mod local;

pub use adapter::RelayAdapter;
pub use errors::RelayError;
pub use event::{
    APP_DATA_KIND, EXPIRATION_TAG, Event, EventTemplate, Filter, PARENT_TAG, PATH_TAG,
};
pub use keys::Keys;
pub use local::{LocalRelay, LocalRelayClient};

/// Callback invoked for every event matching a subscription's filter.
pub type EventCallback = std::sync::Arc<dyn Fn(Event, &Subscription) + Send + Sync>;

/// Connection to a relay, already bound to a signing identity.
///
/// Implementations handle connection management and signing; the adapter only
/// builds templates and filters.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Signs `template` with the client's identity and publishes it.
    ///
    /// # Errors
    /// `RelayError::TransportUnavailable` if the relay cannot be reached.
    async fn publish(&self, template: EventTemplate) -> Result<()>;

    /// Subscribes to events matching `filter`.
    ///
    /// Stored events are replayed before this returns, then live ones are
    /// forwarded until the returned handle is unsubscribed. Events are passed
    /// through as received; callers must verify them.
    fn subscribe(&self, filter: Filter, callback: EventCallback) -> Subscription;
}

/// The identity path under which the adapter reports `author`'s value at `path`.
pub fn author_path(author: &str, path: &str) -> String {
    format!("{author}{path}")
}

/// Splits an identity path into `(author, path)`.
///
/// Returns `None` if `identity` does not start with a public key.
///
/// ```rust
/// # use treelike::relay::{Keys, author_path, split_author_path};
/// let author = Keys::generate().public_key();
/// let identity = author_path(&author, "groups/g1/name");
/// assert_eq!(split_author_path(&identity), Some((author.as_str(), "groups/g1/name")));
/// assert_eq!(split_author_path("groups/g1/name"), None);
/// ```
pub fn split_author_path(identity: &str) -> Option<(&str, &str)> {
    let split = keys::PUBLIC_KEY_SIZE * 2;
    let author = identity.get(..split)?;
    keys::is_public_key(author).then(|| (author, &identity[split..]))
}
