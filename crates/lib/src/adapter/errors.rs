//! Adapter error types.
//!
//! Only `InvalidValue` is ever surfaced to writers; the other variants are
//! produced by storage helpers and absorbed at the adapter boundary.

use thiserror::Error;

/// Errors that can occur during adapter operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A write was attempted without an `updated_at` timestamp.
    #[error("Invalid value at '{path}': {reason}")]
    InvalidValue {
        /// The path that was written
        path: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A stored payload could not be decoded.
    #[error("Failed to parse stored value at '{path}'")]
    ParseFailure {
        /// The path (or storage key) of the malformed payload
        path: String,
        /// The underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// Durable storage could not be read or written.
    #[error("Storage failure: {reason}")]
    Storage {
        /// Description of the failure
        reason: String,
    },
}

impl AdapterError {
    pub fn is_invalid_value(&self) -> bool {
        matches!(self, AdapterError::InvalidValue { .. })
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, AdapterError::ParseFailure { .. })
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, AdapterError::Storage { .. })
    }

    /// The path the error refers to, when there is one.
    pub fn path(&self) -> Option<&str> {
        match self {
            AdapterError::InvalidValue { path, .. } | AdapterError::ParseFailure { path, .. } => {
                Some(path)
            }
            AdapterError::Storage { .. } => None,
        }
    }
}

impl From<AdapterError> for crate::Error {
    fn from(err: AdapterError) -> Self {
        crate::Error::Adapter(err)
    }
}
