//! Persistence layer for the desktop link.
//!
//! Scheduled messages and mirrored notifications survive restarts.
//! Everything else (status, calls, media, transfers) is session state
//! and is rebuilt from the phone after a reconnect.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use async_trait::async_trait;
use link_core::ScheduledMessage;
use link_types::{MirroredNotification, NotificationKey, ScheduleId};

/// Trait for link persistence backends.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Insert or update a scheduled message by id.
    async fn upsert_schedule(&self, message: &ScheduledMessage) -> Result<(), StoreError>;

    /// Delete a scheduled message.
    ///
    /// Deleting an unknown id is not an error.
    async fn delete_schedule(&self, id: ScheduleId) -> Result<(), StoreError>;

    /// Load all scheduled messages, soonest first.
    async fn load_schedules(&self) -> Result<Vec<ScheduledMessage>, StoreError>;

    /// Insert or update a mirrored notification by key.
    ///
    /// Replacing an existing key must not change its position in the
    /// load order.
    async fn upsert_notification(
        &self,
        notification: &MirroredNotification,
    ) -> Result<(), StoreError>;

    /// Delete a mirrored notification.
    ///
    /// Deleting an unknown key is not an error.
    async fn delete_notification(&self, id: &NotificationKey) -> Result<(), StoreError>;

    /// Delete all mirrored notifications.
    async fn clear_notifications(&self) -> Result<(), StoreError>;

    /// Load all mirrored notifications, first observed first.
    async fn load_notifications(&self) -> Result<Vec<MirroredNotification>, StoreError>;
}
