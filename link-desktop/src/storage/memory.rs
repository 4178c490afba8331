//! In-memory storage backend, for tests and demos.

use super::LinkStore;
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use link_core::ScheduledMessage;
use link_types::{MirroredNotification, NotificationKey, ScheduleId};
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory link store.
///
/// Nothing survives a restart. The real runtime uses
/// [`SqliteStore`](super::SqliteStore).
#[derive(Default)]
pub struct MemoryStore {
    schedules: DashMap<ScheduleId, ScheduledMessage>,
    notifications: DashMap<NotificationKey, (u64, MirroredNotification)>,
    arrival: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn upsert_schedule(&self, message: &ScheduledMessage) -> Result<(), StoreError> {
        self.schedules.insert(message.id, message.clone());
        Ok(())
    }

    async fn delete_schedule(&self, id: ScheduleId) -> Result<(), StoreError> {
        self.schedules.remove(&id);
        Ok(())
    }

    async fn load_schedules(&self) -> Result<Vec<ScheduledMessage>, StoreError> {
        let mut all: Vec<ScheduledMessage> = self
            .schedules
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|m| m.scheduled_time);
        Ok(all)
    }

    async fn upsert_notification(
        &self,
        notification: &MirroredNotification,
    ) -> Result<(), StoreError> {
        // A replaced key keeps its original arrival slot.
        let existing = self.notifications.get(&notification.id).map(|entry| entry.0);
        let arrival = existing.unwrap_or_else(|| self.arrival.fetch_add(1, Ordering::Relaxed));
        self.notifications
            .insert(notification.id.clone(), (arrival, notification.clone()));
        Ok(())
    }

    async fn delete_notification(&self, id: &NotificationKey) -> Result<(), StoreError> {
        self.notifications.remove(id);
        Ok(())
    }

    async fn clear_notifications(&self) -> Result<(), StoreError> {
        self.notifications.clear();
        Ok(())
    }

    async fn load_notifications(&self) -> Result<Vec<MirroredNotification>, StoreError> {
        let mut all: Vec<(u64, MirroredNotification)> = self
            .notifications
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|(arrival, _)| *arrival);
        Ok(all.into_iter().map(|(_, n)| n).collect())
    }
}
