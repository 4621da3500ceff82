//!
//! Treelike: a reactive, path-addressed state tree that replicates across
//! independent transports and converges with last-write-wins.
//!
//! ## Core Concepts
//!
//! * **Nodes (`node::Node`)**: Handles bound to a `/`-separated path and a fixed list of adapters.
//!   Writing an object to a node decomposes it into child paths; reading subscribes to every adapter.
//! * **Values (`value::NodeValue`)**: Either a JSON leaf or the directory marker, stamped with
//!   `updated_at` (and optionally `expires_at`) as a `value::TimestampedValue`.
//! * **Resolver (`resolver`)**: The last-write-wins policy with a deterministic tie-break that every
//!   replica applies to reach the same value.
//! * **Adapters (`adapter::Adapter`)**: A uniform `get`/`set`/`list` contract over a backend:
//!     * **MemoryAdapter**: Map-backed reference implementation.
//!     * **PersistentAdapter**: The memory adapter layered over durable `Storage`.
//!     * **BroadcastAdapter**: The memory adapter plus write fan-out to same-device peers.
//!     * **RelayAdapter (`relay`)**: Maps paths onto a flat, author-signed relay event stream.
//! * **Subscriptions (`subscription::Subscription`)**: Idempotent cancellation handles that
//!   cascade through recursive subscriptions.

pub mod adapter;
pub mod clock;
pub mod config;
pub mod node;
pub mod path;
pub mod relay;
pub mod resolver;
pub mod state;
pub mod subscription;
pub mod value;

pub use adapter::{Adapter, Callback, Update};
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use clock::{Clock, SystemClock};
pub use node::{Node, WriteOptions};
pub use subscription::Subscription;
pub use value::{NodeValue, TimestampedValue};

/// Result type used throughout the Treelike library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Treelike library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured adapter errors from the adapter module
    #[error(transparent)]
    Adapter(adapter::AdapterError),

    /// Structured relay errors from the relay module
    #[error(transparent)]
    Relay(relay::RelayError),

    /// Structured configuration errors from the config module
    #[error(transparent)]
    Config(config::ConfigError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Adapter(_) => "adapter",
            Error::Relay(_) => "relay",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error rejects a write that lacks `updated_at`.
    pub fn is_invalid_value(&self) -> bool {
        match self {
            Error::Adapter(adapter_err) => adapter_err.is_invalid_value(),
            _ => false,
        }
    }

    /// Check if this error reflects an unreachable or failing transport.
    pub fn is_transport_error(&self) -> bool {
        match self {
            Error::Relay(relay_err) => relay_err.is_transport_error(),
            _ => false,
        }
    }

    /// Check if this error is caused by a malformed payload.
    pub fn is_parse_error(&self) -> bool {
        match self {
            Error::Serialize(_) => true,
            Error::Adapter(adapter_err) => adapter_err.is_parse_error(),
            Error::Relay(relay_err) => relay_err.is_invalid_event(),
            Error::Config(config_err) => config_err.is_parse_error(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Adapter(adapter_err) => adapter_err.is_storage_error(),
            Error::Config(config_err) => config_err.is_read_error(),
            _ => false,
        }
    }
}
