//! SQLite storage backend for the desktop link.

use super::LinkStore;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use link_core::{ScheduleStatus, ScheduledMessage};
use link_types::{MirroredNotification, NotificationKey, ScheduleId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// SQLite-based link store.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path.to_str().unwrap_or("phonelink.db"))
            .map_err(StoreError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StoreError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_messages (
                id BLOB PRIMARY KEY,
                recipient_number TEXT NOT NULL,
                recipient_name TEXT,
                body TEXT NOT NULL,
                scheduled_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                sent_at INTEGER,
                error_message TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                app_name TEXT NOT NULL,
                title TEXT NOT NULL,
                text TEXT NOT NULL,
                app_icon TEXT,
                posted_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_schedules_time ON scheduled_messages(scheduled_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }
}

#[async_trait]
impl LinkStore for SqliteStore {
    async fn upsert_schedule(&self, message: &ScheduledMessage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_messages
                (id, recipient_number, recipient_name, body, scheduled_at,
                 status, sent_at, error_message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                recipient_number = excluded.recipient_number,
                recipient_name = excluded.recipient_name,
                body = excluded.body,
                scheduled_at = excluded.scheduled_at,
                status = excluded.status,
                sent_at = excluded.sent_at,
                error_message = excluded.error_message
            "#,
        )
        .bind(message.id.as_uuid().as_bytes().as_slice())
        .bind(&message.recipient_number)
        .bind(&message.recipient_name)
        .bind(&message.body)
        .bind(message.scheduled_time.timestamp_millis())
        .bind(status_to_str(message.status))
        .bind(message.sent_at.map(|t| t.timestamp_millis()))
        .bind(&message.error_message)
        .bind(message.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn delete_schedule(&self, id: ScheduleId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM scheduled_messages WHERE id = ?1")
            .bind(id.as_uuid().as_bytes().as_slice())
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn load_schedules(&self) -> Result<Vec<ScheduledMessage>, StoreError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT id, recipient_number, recipient_name, body, scheduled_at,
                   status, sent_at, error_message, created_at
            FROM scheduled_messages
            ORDER BY scheduled_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn upsert_notification(
        &self,
        notification: &MirroredNotification,
    ) -> Result<(), StoreError> {
        // ON CONFLICT keeps the original rowid, so a replaced entry keeps
        // its position in the load order.
        sqlx::query(
            r#"
            INSERT INTO notifications (id, app_name, title, text, app_icon, posted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                app_name = excluded.app_name,
                title = excluded.title,
                text = excluded.text,
                app_icon = excluded.app_icon,
                posted_at = excluded.posted_at
            "#,
        )
        .bind(notification.id.as_str())
        .bind(&notification.app_name)
        .bind(&notification.title)
        .bind(&notification.text)
        .bind(&notification.app_icon)
        .bind(notification.posted_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn delete_notification(&self, id: &NotificationKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM notifications WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn clear_notifications(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM notifications")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn load_notifications(&self) -> Result<Vec<MirroredNotification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, app_name, title, text, app_icon, posted_at
            FROM notifications
            ORDER BY rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }
}

fn status_to_str(status: ScheduleStatus) -> &'static str {
    match status {
        ScheduleStatus::Pending => "pending",
        ScheduleStatus::Sent => "sent",
        ScheduleStatus::Failed => "failed",
        ScheduleStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> Option<ScheduleStatus> {
    match s {
        "pending" => Some(ScheduleStatus::Pending),
        "sent" => Some(ScheduleStatus::Sent),
        "failed" => Some(ScheduleStatus::Failed),
        "cancelled" => Some(ScheduleStatus::Cancelled),
        _ => None,
    }
}

fn millis_to_datetime(millis: i64, field: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::CorruptRow {
        what: format!("{field} out of range: {millis}"),
    })
}

/// Internal row type for scheduled message queries.
#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Vec<u8>,
    recipient_number: String,
    recipient_name: Option<String>,
    body: String,
    scheduled_at: i64,
    status: String,
    sent_at: Option<i64>,
    error_message: Option<String>,
    created_at: i64,
}

impl TryFrom<ScheduleRow> for ScheduledMessage {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let id = ScheduleId::from_bytes(&row.id).ok_or_else(|| StoreError::CorruptRow {
            what: format!("schedule id of {} bytes", row.id.len()),
        })?;
        let status = status_from_str(&row.status).ok_or_else(|| StoreError::CorruptRow {
            what: format!("schedule status {:?}", row.status),
        })?;
        let sent_at = match row.sent_at {
            Some(millis) => Some(millis_to_datetime(millis, "sent_at")?),
            None => None,
        };

        Ok(ScheduledMessage {
            id,
            recipient_number: row.recipient_number,
            recipient_name: row.recipient_name,
            body: row.body,
            scheduled_time: millis_to_datetime(row.scheduled_at, "scheduled_at")?,
            status,
            sent_at,
            error_message: row.error_message,
            created_at: millis_to_datetime(row.created_at, "created_at")?,
        })
    }
}

/// Internal row type for notification queries.
#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    app_name: String,
    title: String,
    text: String,
    app_icon: Option<String>,
    posted_at: i64,
}

impl TryFrom<NotificationRow> for MirroredNotification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(MirroredNotification {
            id: NotificationKey::new(row.id),
            app_name: row.app_name,
            title: row.title,
            text: row.text,
            app_icon: row.app_icon,
            posted_at: millis_to_datetime(row.posted_at, "posted_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    // Millisecond-precision times so values survive the roundtrip exactly.
    fn base_time() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_705_000_000_000).unwrap()
    }

    fn sample_message(offset_secs: i64) -> ScheduledMessage {
        let now = base_time();
        ScheduledMessage::new(
            "+15551234567",
            Some("Sam".to_string()),
            "see you at 6",
            now + Duration::seconds(offset_secs),
            now,
        )
    }

    fn sample_notification(id: &str, text: &str) -> MirroredNotification {
        MirroredNotification {
            id: NotificationKey::new(id),
            app_name: "Messages".to_string(),
            title: "Sam".to_string(),
            text: text.to_string(),
            app_icon: None,
            posted_at: base_time(),
        }
    }

    #[tokio::test]
    async fn schedule_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let message = sample_message(60);

        store.upsert_schedule(&message).await.unwrap();
        let loaded = store.load_schedules().await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], message);
    }

    #[tokio::test]
    async fn upsert_schedule_replaces_existing() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut message = sample_message(60);
        store.upsert_schedule(&message).await.unwrap();

        message.mark_sent(base_time() + Duration::seconds(61));
        store.upsert_schedule(&message).await.unwrap();

        let loaded = store.load_schedules().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, ScheduleStatus::Sent);
        assert_eq!(loaded[0].sent_at, message.sent_at);
    }

    #[tokio::test]
    async fn schedules_load_soonest_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        let late = sample_message(300);
        let soon = sample_message(10);
        let middle = sample_message(60);

        store.upsert_schedule(&late).await.unwrap();
        store.upsert_schedule(&soon).await.unwrap();
        store.upsert_schedule(&middle).await.unwrap();

        let loaded = store.load_schedules().await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].id, soon.id);
        assert_eq!(loaded[1].id, middle.id);
        assert_eq!(loaded[2].id, late.id);
    }

    #[tokio::test]
    async fn delete_schedule_removes_it() {
        let store = SqliteStore::in_memory().await.unwrap();
        let message = sample_message(60);
        store.upsert_schedule(&message).await.unwrap();

        store.delete_schedule(message.id).await.unwrap();

        assert!(store.load_schedules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_schedule_is_noop() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.delete_schedule(ScheduleId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn failed_schedule_keeps_error_message() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut message = sample_message(60);
        message.mark_failed("phone rejected the send");
        store.upsert_schedule(&message).await.unwrap();

        let loaded = store.load_schedules().await.unwrap();
        assert_eq!(loaded[0].status, ScheduleStatus::Failed);
        assert_eq!(
            loaded[0].error_message.as_deref(),
            Some("phone rejected the send")
        );
    }

    #[tokio::test]
    async fn notification_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let notification = sample_notification("key-1", "dinner?");

        store.upsert_notification(&notification).await.unwrap();
        let loaded = store.load_notifications().await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], notification);
    }

    #[tokio::test]
    async fn notifications_load_in_arrival_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        for key in ["first", "second", "third"] {
            store
                .upsert_notification(&sample_notification(key, "hi"))
                .await
                .unwrap();
        }

        let loaded = store.load_notifications().await.unwrap();
        let keys: Vec<&str> = loaded.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(keys, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn replaced_notification_keeps_position() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_notification(&sample_notification("a", "one message"))
            .await
            .unwrap();
        store
            .upsert_notification(&sample_notification("b", "other app"))
            .await
            .unwrap();

        store
            .upsert_notification(&sample_notification("a", "two messages"))
            .await
            .unwrap();

        let loaded = store.load_notifications().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id.as_str(), "a");
        assert_eq!(loaded[0].text, "two messages");
        assert_eq!(loaded[1].id.as_str(), "b");
    }

    #[tokio::test]
    async fn delete_notification_removes_it() {
        let store = SqliteStore::in_memory().await.unwrap();
        let notification = sample_notification("key-1", "hi");
        store.upsert_notification(&notification).await.unwrap();

        store.delete_notification(&notification.id).await.unwrap();

        assert!(store.load_notifications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_notifications_empties_table() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_notification(&sample_notification("a", "hi"))
            .await
            .unwrap();
        store
            .upsert_notification(&sample_notification("b", "ho"))
            .await
            .unwrap();

        store.clear_notifications().await.unwrap();

        assert!(store.load_notifications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phonelink.db");
        let message = sample_message(60);

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.upsert_schedule(&message).await.unwrap();
        }

        let store = SqliteStore::new(&path).await.unwrap();
        let loaded = store.load_schedules().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], message);
    }
}
