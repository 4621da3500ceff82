//! Values stored at a path.
//!
//! A path holds either a leaf (any JSON document) or the directory marker,
//! never both. [`NodeValue`] keeps the marker as a variant of its own so it can
//! never be confused with `null` or with any other JSON content.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, adapter::AdapterError};

/// The content of a single path.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    /// A JSON payload with no children.
    Leaf(Value),
    /// The path has children instead of a value of its own.
    Directory,
}

impl NodeValue {
    /// Creates a leaf from anything convertible into JSON.
    pub fn leaf(value: impl Into<Value>) -> Self {
        NodeValue::Leaf(value.into())
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, NodeValue::Directory)
    }

    pub fn as_leaf(&self) -> Option<&Value> {
        match self {
            NodeValue::Leaf(value) => Some(value),
            NodeValue::Directory => None,
        }
    }

    pub fn into_leaf(self) -> Option<Value> {
        match self {
            NodeValue::Leaf(value) => Some(value),
            NodeValue::Directory => None,
        }
    }

    /// Canonical text form used for tie-breaking and on the wire.
    ///
    /// Leaves serialize to compact JSON with sorted object keys. The directory
    /// marker serializes to the empty string, which no JSON document produces.
    pub fn to_canonical(&self) -> String {
        match self {
            NodeValue::Leaf(value) => value.to_string(),
            NodeValue::Directory => String::new(),
        }
    }

    /// Parses the canonical text form produced by [`NodeValue::to_canonical`].
    pub fn from_canonical(text: &str) -> std::result::Result<Self, serde_json::Error> {
        if text.is_empty() {
            return Ok(NodeValue::Directory);
        }
        serde_json::from_str(text).map(NodeValue::Leaf)
    }
}

impl From<Value> for NodeValue {
    fn from(value: Value) -> Self {
        NodeValue::Leaf(value)
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Leaf(value) => write!(f, "{value}"),
            NodeValue::Directory => write!(f, "<dir>"),
        }
    }
}

/// A value together with the timestamps the resolver orders it by.
///
/// `updated_at` is optional at the type level so that payloads read from
/// storage or the network can be represented before validation; every
/// adapter's write path rejects a value without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredValue", into = "StoredValue")]
pub struct TimestampedValue {
    pub value: NodeValue,
    /// Epoch milliseconds of the write.
    pub updated_at: Option<u64>,
    /// Epoch milliseconds after which the value reads as absent.
    pub expires_at: Option<u64>,
}

impl TimestampedValue {
    pub fn new(value: NodeValue, updated_at: u64) -> Self {
        Self {
            value,
            updated_at: Some(updated_at),
            expires_at: None,
        }
    }

    /// Sets the expiry time in epoch milliseconds.
    pub fn expiring_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now_millis: u64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now_millis)
    }

    /// Returns `updated_at`, or `InvalidValue` if the value was never stamped.
    pub fn require_updated_at(&self, path: &str) -> Result<u64> {
        self.updated_at.ok_or_else(|| {
            AdapterError::InvalidValue {
                path: path.to_string(),
                reason: format!("missing updatedAt in {}", self.value.to_canonical()),
            }
            .into()
        })
    }
}

/// Storage form: `{"value": ..., "updatedAt": ..., "expiresAt": ...}`, with
/// the directory marker written as `"directory": true` and no `value`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    directory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
}

impl From<StoredValue> for TimestampedValue {
    fn from(stored: StoredValue) -> Self {
        let value = if stored.directory {
            NodeValue::Directory
        } else {
            // `"value": null` deserializes as None
            NodeValue::Leaf(stored.value.unwrap_or(Value::Null))
        };
        Self {
            value,
            updated_at: stored.updated_at,
            expires_at: stored.expires_at,
        }
    }
}

impl From<TimestampedValue> for StoredValue {
    fn from(stamped: TimestampedValue) -> Self {
        let (value, directory) = match stamped.value {
            NodeValue::Leaf(value) => (Some(value), false),
            NodeValue::Directory => (None, true),
        };
        Self {
            value,
            directory,
            updated_at: stamped.updated_at,
            expires_at: stamped.expires_at,
        }
    }
}
