//! Error types for the relay module.

use thiserror::Error;

/// Errors that can occur while publishing to or reading from a relay.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RelayError {
    /// The relay could not be reached or refused the connection.
    #[error("Relay unavailable: {0}")]
    TransportUnavailable(String),

    /// An event is structurally invalid (bad id, missing tags, wrong kind).
    #[error("Invalid event: {reason}")]
    InvalidEvent { reason: String },

    /// An event's signature does not verify against its author key.
    #[error("Invalid signature on event {id}")]
    InvalidSignature { id: String },

    /// A key could not be decoded.
    #[error("Invalid key: {reason}")]
    InvalidKey { reason: String },
}

impl RelayError {
    pub fn is_transport_error(&self) -> bool {
        matches!(self, RelayError::TransportUnavailable(_))
    }

    /// Check if this error means an event should be discarded as untrusted.
    pub fn is_invalid_event(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidEvent { .. } | RelayError::InvalidSignature { .. }
        )
    }
}

impl From<RelayError> for crate::Error {
    fn from(err: RelayError) -> Self {
        crate::Error::Relay(err)
    }
}
