//! File transfer records for phonelink.
//!
//! A [`Transfer`] is the observable record of one file moving over the
//! link. The driving I/O lives in link-desktop; this module owns the
//! transition rules: progress is monotonic while in flight, failure
//! freezes it, and nothing leaves a terminal state except an explicit
//! retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use link_types::{LinkError, TransferId};

/// Which way the file is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    /// Desktop to phone
    Upload,
    /// Phone to desktop
    Download,
}

/// Lifecycle state of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    /// Bytes are streaming to the phone
    Uploading,
    /// Bytes are streaming from the phone
    Downloading,
    /// Upload finished
    Sent,
    /// Download finished
    Received,
    /// Ended with an error; progress is frozen where it stopped
    Failed,
}

impl TransferState {
    /// Whether this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Received | Self::Failed)
    }

    /// Whether bytes are still moving.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Uploading | Self::Downloading)
    }
}

/// One file transfer with immutable identity and monotonic progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Transfer id, stable across retries
    pub id: TransferId,
    /// File name, no directory components
    pub file_name: String,
    /// Which way the file is moving
    pub direction: TransferDirection,
    /// Current lifecycle state
    pub state: TransferState,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Bytes moved so far
    pub transferred_bytes: u64,
    /// Failure detail once `Failed`
    pub error: Option<String>,
    /// When the transfer was created
    pub created_at: DateTime<Utc>,
    /// When any field last changed
    pub updated_at: DateTime<Utc>,
}

impl Transfer {
    /// Create a transfer in `Uploading`.
    pub fn upload(
        id: TransferId,
        file_name: impl Into<String>,
        size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            direction: TransferDirection::Upload,
            state: TransferState::Uploading,
            size_bytes,
            transferred_bytes: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a transfer in `Downloading`.
    pub fn download(
        id: TransferId,
        file_name: impl Into<String>,
        size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            direction: TransferDirection::Download,
            state: TransferState::Downloading,
            size_bytes,
            transferred_bytes: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fraction complete, 0.0 to 1.0.
    pub fn progress(&self) -> f32 {
        if self.size_bytes == 0 {
            return match self.state {
                TransferState::Sent | TransferState::Received => 1.0,
                _ => 0.0,
            };
        }
        (self.transferred_bytes as f64 / self.size_bytes as f64) as f32
    }

    /// Record total bytes moved so far.
    ///
    /// Applied only while in flight, and only when it does not move
    /// progress backwards; out-of-order updates are discarded. Counts
    /// above the declared size are clamped to it. Returns whether the
    /// update was applied.
    pub fn record_progress(&mut self, transferred_bytes: u64, now: DateTime<Utc>) -> bool {
        if !self.state.is_in_flight() {
            return false;
        }
        let clamped = transferred_bytes.min(self.size_bytes);
        if clamped < self.transferred_bytes {
            return false;
        }
        self.transferred_bytes = clamped;
        self.updated_at = now;
        true
    }

    /// Finish the transfer: `Uploading` becomes `Sent`, `Downloading`
    /// becomes `Received`. No-op from any other state.
    pub fn complete(&mut self, now: DateTime<Utc>) -> bool {
        let next = match self.state {
            TransferState::Uploading => TransferState::Sent,
            TransferState::Downloading => TransferState::Received,
            _ => return false,
        };
        self.state = next;
        self.transferred_bytes = self.size_bytes;
        self.updated_at = now;
        true
    }

    /// Fail the transfer, recording the error.
    ///
    /// Progress stays frozen where it stopped. No-op once terminal, so a
    /// late transport error cannot overwrite a finished transfer.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> bool {
        if !self.state.is_in_flight() {
            return false;
        }
        self.state = TransferState::Failed;
        self.error = Some(error.into());
        self.updated_at = now;
        true
    }

    /// Restart a failed transfer from zero.
    ///
    /// The only transition out of a terminal state. Identity is kept;
    /// progress and the recorded error are reset.
    pub fn retry(&mut self, now: DateTime<Utc>) -> Result<(), LinkError> {
        if self.state != TransferState::Failed {
            return Err(LinkError::InvalidState(format!(
                "cannot retry transfer in {:?}",
                self.state
            )));
        }
        self.state = match self.direction {
            TransferDirection::Upload => TransferState::Uploading,
            TransferDirection::Download => TransferState::Downloading,
        };
        self.transferred_bytes = 0;
        self.error = None;
        self.updated_at = now;
        Ok(())
    }
}
