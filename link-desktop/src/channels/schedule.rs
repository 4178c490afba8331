//! Scheduled message service.
//!
//! Runs the dispatch loop: wake at the earliest pending scheduled time,
//! send each due message exactly once as `MessagingMessage::Send`, and
//! settle it from the phone's `SendResult` (or a confirmation timeout).
//! Every record mutation is persisted to the store before the snapshot
//! is republished.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use link_core::{next_due_at, ScheduledMessage};
use link_types::{Channel, LinkError, MessagingMessage, ScheduleId};

use crate::dispatch::Outbound;
use crate::storage::LinkStore;

enum ScheduleCommand {
    Schedule {
        recipient_number: String,
        recipient_name: Option<String>,
        body: String,
        scheduled_time: DateTime<Utc>,
        reply: oneshot::Sender<Result<ScheduleId, LinkError>>,
    },
    Update {
        id: ScheduleId,
        new_body: Option<String>,
        new_time: Option<DateTime<Utc>>,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Cancel {
        id: ScheduleId,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Delete {
        id: ScheduleId,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
}

/// Handle to the scheduled message service. Cloneable; all clones talk
/// to the same service task.
#[derive(Clone)]
pub struct ScheduleHandle {
    commands: mpsc::Sender<ScheduleCommand>,
    snapshot_rx: watch::Receiver<Vec<ScheduledMessage>>,
}

impl ScheduleHandle {
    /// Create a pending message to be sent at `scheduled_time`.
    ///
    /// A time already in the past is dispatched on the next loop pass.
    pub async fn schedule(
        &self,
        recipient_number: impl Into<String>,
        recipient_name: Option<String>,
        body: impl Into<String>,
        scheduled_time: DateTime<Utc>,
    ) -> Result<ScheduleId, LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(ScheduleCommand::Schedule {
                recipient_number: recipient_number.into(),
                recipient_name,
                body: body.into(),
                scheduled_time,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }

    /// Edit the body and/or time of a pending message.
    pub async fn update(
        &self,
        id: ScheduleId,
        new_body: Option<String>,
        new_time: Option<DateTime<Utc>>,
    ) -> Result<(), LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(ScheduleCommand::Update {
                id,
                new_body,
                new_time,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }

    /// Cancel a pending message. Cancelling a message that already
    /// settled is a no-op.
    pub async fn cancel(&self, id: ScheduleId) -> Result<(), LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(ScheduleCommand::Cancel {
                id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }

    /// Remove a record in any state.
    pub async fn delete(&self, id: ScheduleId) -> Result<(), LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(ScheduleCommand::Delete {
                id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }

    /// Current records, ordered by scheduled time.
    pub fn snapshot(&self) -> Vec<ScheduledMessage> {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that observes every snapshot change.
    pub fn watch(&self) -> watch::Receiver<Vec<ScheduledMessage>> {
        self.snapshot_rx.clone()
    }
}

pub(crate) struct ScheduleService {
    store: Arc<dyn LinkStore>,
    outbound: Outbound,
    send_timeout: Duration,
    messages: Vec<ScheduledMessage>,
    /// Dispatched sends awaiting the phone's verdict, by confirmation
    /// deadline. A message in here is not eligible for dispatch again.
    in_flight: HashMap<ScheduleId, Instant>,
    snapshot_tx: watch::Sender<Vec<ScheduledMessage>>,
}

impl ScheduleService {
    pub(crate) fn spawn(
        outbound: Outbound,
        inbound: mpsc::Receiver<MessagingMessage>,
        store: Arc<dyn LinkStore>,
        send_timeout: Duration,
    ) -> (ScheduleHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(Vec::new());
        let service = ScheduleService {
            store,
            outbound,
            send_timeout,
            messages: Vec::new(),
            in_flight: HashMap::new(),
            snapshot_tx,
        };
        let task = tokio::spawn(service.run(command_rx, inbound));
        let handle = ScheduleHandle {
            commands: command_tx,
            snapshot_rx,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ScheduleCommand>,
        mut inbound: mpsc::Receiver<MessagingMessage>,
    ) {
        match self.store.load_schedules().await {
            Ok(loaded) => self.messages = loaded,
            Err(e) => warn!(error = %e, "failed to load scheduled messages"),
        }
        self.publish();

        let mut link_open = true;
        loop {
            let next_due = next_due_at(
                self.messages
                    .iter()
                    .filter(|m| !self.in_flight.contains_key(&m.id)),
            );
            let next_confirm = self.in_flight.values().min().copied();
            tokio::select! {
                maybe_command = commands.recv() => match maybe_command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                maybe_message = inbound.recv(), if link_open => match maybe_message {
                    Some(message) => self.on_remote(message).await,
                    None => {
                        link_open = false;
                        self.on_link_closed().await;
                    }
                },
                _ = wake_at(next_due), if next_due.is_some() => {
                    self.sweep_due().await;
                }
                _ = confirm_timer(next_confirm), if next_confirm.is_some() => {
                    self.expire_confirmations().await;
                }
            }
        }
    }

    async fn on_command(&mut self, command: ScheduleCommand) {
        match command {
            ScheduleCommand::Schedule {
                recipient_number,
                recipient_name,
                body,
                scheduled_time,
                reply,
            } => {
                let result = self
                    .schedule(recipient_number, recipient_name, body, scheduled_time)
                    .await;
                let _ = reply.send(result);
            }
            ScheduleCommand::Update {
                id,
                new_body,
                new_time,
                reply,
            } => {
                let result = self.update(id, new_body, new_time).await;
                let _ = reply.send(result);
            }
            ScheduleCommand::Cancel { id, reply } => {
                let result = self.cancel(id).await;
                let _ = reply.send(result);
            }
            ScheduleCommand::Delete { id, reply } => {
                let result = self.delete(id).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn schedule(
        &mut self,
        recipient_number: String,
        recipient_name: Option<String>,
        body: String,
        scheduled_time: DateTime<Utc>,
    ) -> Result<ScheduleId, LinkError> {
        if recipient_number.trim().is_empty() {
            return Err(LinkError::InvalidState("recipient number is empty".into()));
        }
        if body.trim().is_empty() {
            return Err(LinkError::InvalidState("message body is empty".into()));
        }
        let message = ScheduledMessage::new(
            recipient_number,
            recipient_name,
            body,
            scheduled_time,
            Utc::now(),
        );
        let id = message.id;
        self.store.upsert_schedule(&message).await?;
        self.messages.push(message);
        self.publish();
        Ok(id)
    }

    async fn update(
        &mut self,
        id: ScheduleId,
        new_body: Option<String>,
        new_time: Option<DateTime<Utc>>,
    ) -> Result<(), LinkError> {
        if let Some(body) = &new_body {
            if body.trim().is_empty() {
                return Err(LinkError::InvalidState("message body is empty".into()));
            }
        }
        let index = self.find(id)?;
        let mut updated = self.messages[index].clone();
        updated.update(new_body, new_time)?;
        self.store.upsert_schedule(&updated).await?;
        self.messages[index] = updated;
        self.publish();
        Ok(())
    }

    async fn cancel(&mut self, id: ScheduleId) -> Result<(), LinkError> {
        let index = self.find(id)?;
        let mut updated = self.messages[index].clone();
        if !updated.cancel() {
            return Ok(());
        }
        self.store.upsert_schedule(&updated).await?;
        self.messages[index] = updated;
        self.publish();
        Ok(())
    }

    async fn delete(&mut self, id: ScheduleId) -> Result<(), LinkError> {
        let index = self.find(id)?;
        self.store.delete_schedule(id).await?;
        self.messages.remove(index);
        self.in_flight.remove(&id);
        self.publish();
        Ok(())
    }

    fn find(&self, id: ScheduleId) -> Result<usize, LinkError> {
        self.messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| LinkError::InvalidState("unknown scheduled message".into()))
    }

    async fn on_remote(&mut self, message: MessagingMessage) {
        match message {
            MessagingMessage::SendResult {
                request_id,
                accepted,
                error,
            } => {
                if !self.in_flight.contains_key(&request_id) {
                    debug!(%request_id, "result for a send that is not in flight");
                    return;
                }
                let outcome = if accepted {
                    Ok(Utc::now())
                } else {
                    Err(error.unwrap_or_else(|| "rejected by phone".into()))
                };
                self.resolve(request_id, outcome).await;
            }
            other => {
                debug!(?other, "ignoring non-result messaging frame");
            }
        }
    }

    async fn on_link_closed(&mut self) {
        let unconfirmed: Vec<ScheduleId> = self.in_flight.keys().copied().collect();
        for id in unconfirmed {
            self.resolve(id, Err("link lost before delivery confirmation".into()))
                .await;
        }
    }

    async fn sweep_due(&mut self) {
        let now = Utc::now();
        let due: Vec<ScheduleId> = self
            .messages
            .iter()
            .filter(|m| m.is_due(now) && !self.in_flight.contains_key(&m.id))
            .map(|m| m.id)
            .collect();
        for id in due {
            self.dispatch(id).await;
        }
    }

    async fn dispatch(&mut self, id: ScheduleId) {
        let Some(message) = self.messages.iter().find(|m| m.id == id) else {
            return;
        };
        let send = MessagingMessage::Send {
            request_id: id,
            to: message.recipient_number.clone(),
            body: message.body.clone(),
        };
        debug!(%id, "dispatching scheduled message");
        let sent = match send.to_bytes() {
            Ok(payload) => self.outbound.send(Channel::Messaging, payload).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => {
                self.in_flight
                    .insert(id, Instant::now() + self.send_timeout);
            }
            Err(e) => {
                self.resolve(id, Err(e.to_string())).await;
            }
        }
    }

    async fn expire_confirmations(&mut self) {
        let now = Instant::now();
        let expired: Vec<ScheduleId> = self
            .in_flight
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.resolve(id, Err("no delivery confirmation from phone".into()))
                .await;
        }
    }

    /// Settles a dispatched send. `Ok(at)` marks it sent, `Err` failed.
    async fn resolve(&mut self, id: ScheduleId, outcome: Result<DateTime<Utc>, String>) {
        self.in_flight.remove(&id);
        let Some(index) = self.messages.iter().position(|m| m.id == id) else {
            return;
        };
        let mut updated = self.messages[index].clone();
        let changed = match outcome {
            Ok(at) => updated.mark_sent(at),
            Err(error) => {
                warn!(%id, error = %error, "scheduled send failed");
                updated.mark_failed(error)
            }
        };
        if !changed {
            return;
        }
        if let Err(e) = self.store.upsert_schedule(&updated).await {
            warn!(error = %e, "failed to persist schedule outcome");
        }
        self.messages[index] = updated;
        self.publish();
    }

    fn publish(&self) {
        let mut snapshot = self.messages.clone();
        snapshot.sort_by_key(|m| m.scheduled_time);
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn wake_at(due: Option<DateTime<Utc>>) {
    match due {
        Some(at) => {
            let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn confirm_timer(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::channels::testing::wait_for;
    use crate::storage::MemoryStore;
    use crate::transport::{MockTransport, Transport};
    use link_core::ScheduleStatus;
    use link_types::Envelope;

    struct Rig {
        transport: MockTransport,
        inbound_tx: mpsc::Sender<MessagingMessage>,
        store: Arc<MemoryStore>,
        handle: ScheduleHandle,
    }

    async fn spawn_rig() -> Rig {
        spawn_rig_with(MemoryStore::new(), true, Duration::from_secs(15)).await
    }

    async fn spawn_rig_with(store: MemoryStore, connected: bool, send_timeout: Duration) -> Rig {
        let transport = MockTransport::new();
        if connected {
            transport.connect("phone").await.unwrap();
        }
        let outbound = Outbound::new(Arc::new(transport.clone()), Duration::from_secs(5));
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let store = Arc::new(store);
        let (handle, _task) = ScheduleService::spawn(
            outbound,
            inbound_rx,
            store.clone() as Arc<dyn LinkStore>,
            send_timeout,
        );
        Rig {
            transport,
            inbound_tx,
            store,
            handle,
        }
    }

    fn sent_messaging(transport: &MockTransport) -> Vec<MessagingMessage> {
        transport
            .sent_messages()
            .iter()
            .filter_map(|bytes| {
                let envelope = Envelope::from_bytes(bytes).ok()?;
                if envelope.channel().ok()? != Channel::Messaging {
                    return None;
                }
                MessagingMessage::from_bytes(&envelope.payload).ok()
            })
            .collect()
    }

    fn send_count(transport: &MockTransport) -> usize {
        sent_messaging(transport)
            .iter()
            .filter(|m| matches!(m, MessagingMessage::Send { .. }))
            .count()
    }

    async fn first_send(transport: &MockTransport) -> (ScheduleId, String, String) {
        for _ in 0..200 {
            let sent = sent_messaging(transport);
            if let Some(MessagingMessage::Send {
                request_id,
                to,
                body,
            }) = sent.into_iter().next()
            {
                return (request_id, to, body);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no scheduled message was dispatched");
    }

    async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), fut)
            .await
            .expect("test wait timed out")
    }

    fn soon(ms: i64) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::milliseconds(ms)
    }

    #[tokio::test]
    async fn schedule_rejects_blank_input() {
        let rig = spawn_rig().await;

        let no_recipient = rig.handle.schedule("  ", None, "hi", soon(60_000)).await;
        assert!(matches!(no_recipient, Err(LinkError::InvalidState(_))));

        let no_body = rig
            .handle
            .schedule("+15551234567", None, "   ", soon(60_000))
            .await;
        assert!(matches!(no_body, Err(LinkError::InvalidState(_))));

        assert!(rig.handle.snapshot().is_empty());
    }

    #[tokio::test]
    async fn schedule_persists_before_publishing() {
        let rig = spawn_rig().await;

        let id = rig
            .handle
            .schedule("+15551234567", Some("Pat".into()), "hi", soon(60_000))
            .await
            .unwrap();

        let stored = rig.store.load_schedules().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].status, ScheduleStatus::Pending);

        let snapshot = rig.handle.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].recipient_name.as_deref(), Some("Pat"));
    }

    #[tokio::test]
    async fn due_message_dispatches_exactly_once_and_marks_sent() {
        let rig = spawn_rig().await;
        let id = rig
            .handle
            .schedule("+15551234567", None, "hi", soon(100))
            .await
            .unwrap();

        let (request_id, to, body) = within(first_send(&rig.transport)).await;
        assert_eq!(request_id, id);
        assert_eq!(to, "+15551234567");
        assert_eq!(body, "hi");

        rig.inbound_tx
            .send(MessagingMessage::SendResult {
                request_id: id,
                accepted: true,
                error: None,
            })
            .await
            .unwrap();

        let mut rx = rig.handle.watch();
        let snapshot = within(wait_for(&mut rx, |msgs| {
            msgs.iter()
                .any(|m| m.id == id && m.status == ScheduleStatus::Sent)
        }))
        .await;
        assert!(snapshot[0].sent_at.is_some());
        assert_eq!(send_count(&rig.transport), 1);

        let stored = rig.store.load_schedules().await.unwrap();
        assert_eq!(stored[0].status, ScheduleStatus::Sent);
    }

    #[tokio::test]
    async fn rejected_result_marks_failed_without_retry() {
        let rig = spawn_rig().await;
        let id = rig
            .handle
            .schedule("+15551234567", None, "hi", soon(50))
            .await
            .unwrap();

        within(first_send(&rig.transport)).await;
        rig.inbound_tx
            .send(MessagingMessage::SendResult {
                request_id: id,
                accepted: false,
                error: Some("no SMS permission".into()),
            })
            .await
            .unwrap();

        let mut rx = rig.handle.watch();
        let snapshot = within(wait_for(&mut rx, |msgs| {
            msgs.iter()
                .any(|m| m.id == id && m.status == ScheduleStatus::Failed)
        }))
        .await;
        assert_eq!(
            snapshot[0].error_message.as_deref(),
            Some("no SMS permission")
        );
        assert_eq!(send_count(&rig.transport), 1);
    }

    #[tokio::test]
    async fn unconfirmed_send_fails_after_timeout() {
        let rig = spawn_rig_with(MemoryStore::new(), true, Duration::from_millis(100)).await;
        let id = rig
            .handle
            .schedule("+15551234567", None, "hi", soon(0))
            .await
            .unwrap();

        let mut rx = rig.handle.watch();
        let snapshot = within(wait_for(&mut rx, |msgs| {
            msgs.iter()
                .any(|m| m.id == id && m.status == ScheduleStatus::Failed)
        }))
        .await;
        assert!(snapshot[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("confirmation"));
        assert_eq!(send_count(&rig.transport), 1);
    }

    #[tokio::test]
    async fn due_while_link_down_fails_without_dispatch() {
        let rig = spawn_rig_with(MemoryStore::new(), false, Duration::from_secs(15)).await;
        let id = rig
            .handle
            .schedule("+15551234567", None, "hi", soon(0))
            .await
            .unwrap();

        let mut rx = rig.handle.watch();
        within(wait_for(&mut rx, |msgs| {
            msgs.iter()
                .any(|m| m.id == id && m.status == ScheduleStatus::Failed)
        }))
        .await;
        assert!(rig.transport.sent_messages().is_empty());

        let stored = rig.store.load_schedules().await.unwrap();
        assert_eq!(stored[0].status, ScheduleStatus::Failed);
    }

    #[tokio::test]
    async fn startup_sweep_dispatches_past_due_once() {
        let store = MemoryStore::new();
        let overdue = ScheduledMessage::new(
            "+15551234567",
            None,
            "while you were away",
            Utc::now() - ChronoDuration::minutes(5),
            Utc::now() - ChronoDuration::minutes(10),
        );
        let id = overdue.id;
        store.upsert_schedule(&overdue).await.unwrap();

        let rig = spawn_rig_with(store, true, Duration::from_secs(15)).await;

        let (request_id, _, _) = within(first_send(&rig.transport)).await;
        assert_eq!(request_id, id);

        rig.inbound_tx
            .send(MessagingMessage::SendResult {
                request_id: id,
                accepted: true,
                error: None,
            })
            .await
            .unwrap();

        let mut rx = rig.handle.watch();
        within(wait_for(&mut rx, |msgs| {
            msgs.iter()
                .any(|m| m.id == id && m.status == ScheduleStatus::Sent)
        }))
        .await;
        assert_eq!(send_count(&rig.transport), 1);
    }

    #[tokio::test]
    async fn update_moves_the_dispatch_time() {
        let rig = spawn_rig().await;
        let id = rig
            .handle
            .schedule("+15551234567", None, "hi", soon(600_000))
            .await
            .unwrap();

        rig.handle
            .update(id, Some("hello".into()), Some(soon(100)))
            .await
            .unwrap();

        let (request_id, _, body) = within(first_send(&rig.transport)).await;
        assert_eq!(request_id, id);
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn update_is_rejected_once_settled() {
        let rig = spawn_rig().await;
        let id = rig
            .handle
            .schedule("+15551234567", None, "hi", soon(50))
            .await
            .unwrap();
        within(first_send(&rig.transport)).await;
        rig.inbound_tx
            .send(MessagingMessage::SendResult {
                request_id: id,
                accepted: true,
                error: None,
            })
            .await
            .unwrap();
        let mut rx = rig.handle.watch();
        within(wait_for(&mut rx, |msgs| {
            msgs.iter()
                .any(|m| m.id == id && m.status == ScheduleStatus::Sent)
        }))
        .await;

        let result = rig.handle.update(id, Some("too late".into()), None).await;
        assert!(matches!(result, Err(LinkError::InvalidState(_))));
    }

    #[tokio::test]
    async fn cancel_prevents_dispatch() {
        let rig = spawn_rig().await;
        let id = rig
            .handle
            .schedule("+15551234567", None, "hi", soon(300))
            .await
            .unwrap();

        rig.handle.cancel(id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(rig.transport.sent_messages().is_empty());
        let snapshot = rig.handle.snapshot();
        assert_eq!(snapshot[0].status, ScheduleStatus::Cancelled);
        let stored = rig.store.load_schedules().await.unwrap();
        assert_eq!(stored[0].status, ScheduleStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_after_settling_is_a_noop() {
        let rig = spawn_rig().await;
        let id = rig
            .handle
            .schedule("+15551234567", None, "hi", soon(50))
            .await
            .unwrap();
        within(first_send(&rig.transport)).await;
        rig.inbound_tx
            .send(MessagingMessage::SendResult {
                request_id: id,
                accepted: true,
                error: None,
            })
            .await
            .unwrap();
        let mut rx = rig.handle.watch();
        within(wait_for(&mut rx, |msgs| {
            msgs.iter()
                .any(|m| m.id == id && m.status == ScheduleStatus::Sent)
        }))
        .await;

        rig.handle.cancel(id).await.unwrap();

        assert_eq!(rig.handle.snapshot()[0].status, ScheduleStatus::Sent);
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let rig = spawn_rig().await;
        let id = rig
            .handle
            .schedule("+15551234567", None, "hi", soon(60_000))
            .await
            .unwrap();

        rig.handle.delete(id).await.unwrap();

        assert!(rig.handle.snapshot().is_empty());
        assert!(rig.store.load_schedules().await.unwrap().is_empty());

        let again = rig.handle.delete(id).await;
        assert!(matches!(again, Err(LinkError::InvalidState(_))));
    }

    #[tokio::test]
    async fn snapshot_orders_by_scheduled_time() {
        let rig = spawn_rig().await;
        rig.handle
            .schedule("+15551111111", None, "later", soon(300_000))
            .await
            .unwrap();
        rig.handle
            .schedule("+15552222222", None, "sooner", soon(100_000))
            .await
            .unwrap();

        let snapshot = rig.handle.snapshot();
        assert_eq!(snapshot[0].recipient_number, "+15552222222");
        assert_eq!(snapshot[1].recipient_number, "+15551111111");
    }
}
