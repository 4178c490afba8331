//! Error types surfaced by link operations.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in link operations.
///
/// Validation errors (`Busy`, `InvalidState`) are rejected at the call
/// site and never mutate entity state. Runtime errors move the affected
/// entity to its failure state and are recorded on it for display; none
/// of them crash the process.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The transport is disconnected; the operation was not attempted
    #[error("link is down")]
    LinkDown,

    /// The operation did not complete in time
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A call is already ringing or active
    #[error("another call is in progress")]
    Busy,

    /// The operation is not valid for the entity's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Local file or storage failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The phone refused the request
    #[error("rejected by phone: {0}")]
    RemoteRejected(String),

    /// MessagePack serialization failed
    #[error("encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Unrecognized channel discriminator
    #[error("unknown channel tag: {0}")]
    UnknownChannel(u8),
}

impl LinkError {
    /// Whether this error rejects an operation without touching state.
    ///
    /// Everything else is a runtime failure that lands on the entity.
    pub fn is_validation(&self) -> bool {
        matches!(self, LinkError::Busy | LinkError::InvalidState(_))
    }
}
