//! Notification log for phonelink.
//!
//! This module provides the in-memory list of mirrored notifications
//! with:
//! - Arrival ordering (oldest first)
//! - A retention cap to prevent unbounded memory growth
//! - Dedupe by phone-side key (replace in place, position kept)
//!
//! The log is used by link-desktop's notification mirror service; the
//! service handles persistence and dismissal signaling around it.

use std::collections::VecDeque;

use link_types::{MirroredNotification, NotificationKey};

/// What happened to an ingested notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    /// New entry appended at the end.
    Appended,
    /// Same key was already present; the entry was updated in place.
    Replaced,
    /// Appended, and the oldest entry was evicted to stay under the cap.
    Evicted(MirroredNotification),
}

/// Ordered, capped notification list.
///
/// The cap counts entries, not bytes. Eviction only happens on append;
/// replacing an existing key never changes the length.
#[derive(Debug, Clone)]
pub struct NotificationLog {
    entries: VecDeque<MirroredNotification>,
    cap: usize,
}

impl NotificationLog {
    /// Create an empty log holding at most `cap` entries.
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    /// Ingest a notification from the phone.
    ///
    /// A key already present is replaced in place, keeping its position.
    /// Otherwise the notification is appended, evicting the oldest entry
    /// once the cap would be exceeded.
    pub fn ingest(&mut self, notification: MirroredNotification) -> Ingest {
        if let Some(existing) = self.entries.iter_mut().find(|n| n.id == notification.id) {
            *existing = notification;
            return Ingest::Replaced;
        }
        self.entries.push_back(notification);
        if self.entries.len() > self.cap {
            // len > cap >= 1, the front exists
            if let Some(evicted) = self.entries.pop_front() {
                return Ingest::Evicted(evicted);
            }
        }
        Ingest::Appended
    }

    /// Remove the entry with the given key.
    ///
    /// Removes exactly one entry when present; calling again for the
    /// same key is a no-op. Returns whether anything was removed.
    pub fn dismiss(&mut self, id: &NotificationKey) -> bool {
        match self.entries.iter().position(|n| &n.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether the key is currently present.
    pub fn contains(&self, id: &NotificationKey) -> bool {
        self.entries.iter().any(|n| &n.id == id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The retention cap.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Clone the entries out in arrival order, oldest first.
    pub fn snapshot(&self) -> Vec<MirroredNotification> {
        self.entries.iter().cloned().collect()
    }
}
