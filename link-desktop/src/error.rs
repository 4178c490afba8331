//! Error types for the desktop link runtime.

use link_types::LinkError;

/// Persistence layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted row could not be decoded.
    #[error("corrupt row: {what}")]
    CorruptRow {
        /// What was wrong with the row.
        what: String,
    },
}

impl From<StoreError> for LinkError {
    fn from(e: StoreError) -> Self {
        LinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
