//! Scheduled message records for phonelink.
//!
//! A scheduled message is data, not an active task, until it becomes
//! due. This module owns the record and its lifecycle rules; the
//! dispatch loop in link-desktop decides when to act on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use link_types::{LinkError, ScheduleId};

/// Lifecycle status of a scheduled message.
///
/// `Pending` is the only state the dispatch loop acts on. The soft
/// terminal states stay around until the user deletes the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleStatus {
    /// Waiting for its scheduled time
    Pending,
    /// Dispatched and accepted by the phone
    Sent,
    /// Dispatch was attempted once and failed
    Failed,
    /// Cancelled before dispatch
    Cancelled,
}

/// One scheduled outbound message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    /// Record id; doubles as the persistence key
    pub id: ScheduleId,
    /// Recipient number
    pub recipient_number: String,
    /// Recipient display name, for the UI only
    pub recipient_name: Option<String>,
    /// Message body
    pub body: String,
    /// When to send
    pub scheduled_time: DateTime<Utc>,
    /// Lifecycle status
    pub status: ScheduleStatus,
    /// When the phone accepted the send
    pub sent_at: Option<DateTime<Utc>>,
    /// Why dispatch failed
    pub error_message: Option<String>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl ScheduledMessage {
    /// Create a pending message.
    pub fn new(
        recipient_number: impl Into<String>,
        recipient_name: Option<String>,
        body: impl Into<String>,
        scheduled_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ScheduleId::new(),
            recipient_number: recipient_number.into(),
            recipient_name,
            body: body.into(),
            scheduled_time,
            status: ScheduleStatus::Pending,
            sent_at: None,
            error_message: None,
            created_at: now,
        }
    }

    /// Whether the dispatch loop should act on this record now.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Pending && self.scheduled_time <= now
    }

    /// Edit the body and/or time of a pending message.
    ///
    /// Rejected with `InvalidState` for any other status; the record is
    /// left untouched on rejection.
    pub fn update(
        &mut self,
        new_body: Option<String>,
        new_time: Option<DateTime<Utc>>,
    ) -> Result<(), LinkError> {
        if self.status != ScheduleStatus::Pending {
            return Err(LinkError::InvalidState(format!(
                "cannot edit a {:?} message",
                self.status
            )));
        }
        if let Some(body) = new_body {
            self.body = body;
        }
        if let Some(time) = new_time {
            self.scheduled_time = time;
        }
        Ok(())
    }

    /// Cancel a pending message.
    ///
    /// Cancelling a non-pending message is a no-op, not an error; the
    /// returned flag says whether anything changed.
    pub fn cancel(&mut self) -> bool {
        if self.status != ScheduleStatus::Pending {
            return false;
        }
        self.status = ScheduleStatus::Cancelled;
        true
    }

    /// Record a successful dispatch.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> bool {
        if self.status != ScheduleStatus::Pending {
            return false;
        }
        self.status = ScheduleStatus::Sent;
        self.sent_at = Some(at);
        true
    }

    /// Record a failed dispatch.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> bool {
        if self.status != ScheduleStatus::Pending {
            return false;
        }
        self.status = ScheduleStatus::Failed;
        self.error_message = Some(error.into());
        true
    }
}

impl std::fmt::Debug for ScheduledMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledMessage")
            .field("id", &self.id)
            .field("recipient_number", &self.recipient_number)
            .field("body", &"[REDACTED]")
            .field("scheduled_time", &self.scheduled_time)
            .field("status", &self.status)
            .finish()
    }
}

/// The earliest scheduled time among pending messages.
///
/// This is the dispatch loop's next wake-up; `None` means there is
/// nothing to wait for.
pub fn next_due_at<'a, I>(messages: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a ScheduledMessage>,
{
    messages
        .into_iter()
        .filter(|m| m.status == ScheduleStatus::Pending)
        .map(|m| m.scheduled_time)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn pending_in(seconds: i64) -> ScheduledMessage {
        let t = now() + Duration::seconds(seconds);
        ScheduledMessage::new("+15551234567", None, "hi", t, now())
    }

    #[test]
    fn new_message_is_pending() {
        let m = pending_in(60);
        assert_eq!(m.status, ScheduleStatus::Pending);
        assert!(m.sent_at.is_none());
        assert!(m.error_message.is_none());
    }

    #[test]
    fn due_exactly_at_scheduled_time() {
        let t = now();
        let m = ScheduledMessage::new("+15551234567", None, "hi", t, t);
        assert!(m.is_due(t));
        assert!(!m.is_due(t - Duration::seconds(1)));
    }

    #[test]
    fn non_pending_is_never_due() {
        let mut m = pending_in(-60);
        assert!(m.is_due(now()));
        m.cancel();
        assert!(!m.is_due(now()));
    }

    #[test]
    fn cancel_pending_transitions_to_cancelled() {
        let mut m = pending_in(60);
        assert!(m.cancel());
        assert_eq!(m.status, ScheduleStatus::Cancelled);
    }

    #[test]
    fn cancel_is_a_noop_on_terminal_states() {
        let mut m = pending_in(60);
        m.mark_sent(now());
        assert!(!m.cancel());
        assert_eq!(m.status, ScheduleStatus::Sent);

        let mut m = pending_in(60);
        m.mark_failed("no signal");
        assert!(!m.cancel());
        assert_eq!(m.status, ScheduleStatus::Failed);

        let mut m = pending_in(60);
        m.cancel();
        assert!(!m.cancel());
        assert_eq!(m.status, ScheduleStatus::Cancelled);
    }

    #[test]
    fn update_edits_pending_fields() {
        let mut m = pending_in(60);
        let new_time = now() + Duration::minutes(5);
        m.update(Some("new text".into()), Some(new_time)).unwrap();
        assert_eq!(m.body, "new text");
        assert_eq!(m.scheduled_time, new_time);
    }

    #[test]
    fn update_with_no_fields_is_allowed() {
        let mut m = pending_in(60);
        let before = m.clone();
        m.update(None, None).unwrap();
        assert_eq!(m, before);
    }

    #[test]
    fn update_rejected_once_terminal_and_leaves_record_unchanged() {
        let mut m = pending_in(60);
        m.mark_sent(now());
        let before = m.clone();

        let err = m.update(Some("too late".into()), None).unwrap_err();
        assert!(matches!(err, LinkError::InvalidState(_)));
        assert_eq!(m, before);
    }

    #[test]
    fn mark_sent_records_time() {
        let mut m = pending_in(-1);
        let at = now();
        assert!(m.mark_sent(at));
        assert_eq!(m.status, ScheduleStatus::Sent);
        assert_eq!(m.sent_at, Some(at));
    }

    #[test]
    fn mark_failed_records_error() {
        let mut m = pending_in(-1);
        assert!(m.mark_failed("phone rejected: no SMS permission"));
        assert_eq!(m.status, ScheduleStatus::Failed);
        assert_eq!(
            m.error_message.as_deref(),
            Some("phone rejected: no SMS permission")
        );
    }

    #[test]
    fn mark_sent_does_not_touch_terminal_records() {
        let mut m = pending_in(60);
        m.cancel();
        assert!(!m.mark_sent(now()));
        assert_eq!(m.status, ScheduleStatus::Cancelled);
        assert!(m.sent_at.is_none());
    }

    #[test]
    fn next_due_ignores_terminal_records() {
        let soon = pending_in(10);
        let later = pending_in(600);
        let mut done = pending_in(5);
        done.mark_sent(now());

        let messages = vec![later.clone(), soon.clone(), done];
        assert_eq!(next_due_at(&messages), Some(soon.scheduled_time));
    }

    #[test]
    fn next_due_is_none_when_nothing_pending() {
        let mut m = pending_in(10);
        m.cancel();
        assert_eq!(next_due_at(&[m]), None);
        assert_eq!(next_due_at(&[]), None);
    }

    #[test]
    fn body_never_appears_in_debug() {
        let m = ScheduledMessage::new("+15551234567", None, "the secret plan", now(), now());
        let debug = format!("{:?}", m);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("the secret plan"));
    }
}
