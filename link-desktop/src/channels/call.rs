//! Call session service.
//!
//! Owns the [`CallMachine`] and the missed-call list. Commands arrive
//! from [`CallHandle`]; telephony frames arrive from the dispatcher.
//! Every event runs through the machine, the produced actions are
//! executed here (signaling sends, the dial timer, missed-call
//! recording), and the snapshot is republished when state changed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use link_core::{CallAction, CallEvent, CallMachine, CallSession, CallState};
use link_types::{CallEndReason, CallId, Channel, LinkError, TelephonyMessage};

use crate::dispatch::Outbound;

/// One call the user did not get to take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissedCall {
    /// Caller number.
    pub number: String,
    /// Contact name, if the phone resolved one.
    pub display_name: Option<String>,
    /// When the call was missed.
    pub missed_at: DateTime<Utc>,
}

/// Observable call state: the current session plus recent missed calls.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallSnapshot {
    /// The current session. Stays visible after it ends, until the next
    /// call replaces it.
    pub session: Option<CallSession>,
    /// Missed calls, newest first, capped by configuration.
    pub missed_calls: Vec<MissedCall>,
}

enum CallCommand {
    PlaceCall {
        number: String,
        reply: oneshot::Sender<Result<CallId, LinkError>>,
    },
    Answer {
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Reject {
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    HangUp {
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
}

/// Handle to the call service. Cloneable; all clones talk to the same
/// service task.
#[derive(Clone)]
pub struct CallHandle {
    commands: mpsc::Sender<CallCommand>,
    snapshot_rx: watch::Receiver<CallSnapshot>,
}

impl CallHandle {
    /// Ask the phone to dial `number`. Returns the new session id once
    /// the dial request is on the wire.
    pub async fn place_call(&self, number: impl Into<String>) -> Result<CallId, LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(CallCommand::PlaceCall {
                number: number.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }

    /// Answer the ringing incoming call.
    pub async fn answer(&self) -> Result<(), LinkError> {
        self.request(|reply| CallCommand::Answer { reply }).await
    }

    /// Reject the ringing incoming call.
    pub async fn reject(&self) -> Result<(), LinkError> {
        self.request(|reply| CallCommand::Reject { reply }).await
    }

    /// End the dialing or active call.
    pub async fn hang_up(&self) -> Result<(), LinkError> {
        self.request(|reply| CallCommand::HangUp { reply }).await
    }

    /// Current call state.
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that observes every snapshot change.
    pub fn watch(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot_rx.clone()
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), LinkError>>) -> CallCommand,
    ) -> Result<(), LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }
}

pub(crate) struct CallService {
    machine: CallMachine,
    missed: Vec<MissedCall>,
    retention: usize,
    dial_timeout: Duration,
    outbound: Outbound,
    snapshot_tx: watch::Sender<CallSnapshot>,
    dial_deadline: Option<(CallId, Instant)>,
}

impl CallService {
    pub(crate) fn spawn(
        outbound: Outbound,
        inbound: mpsc::Receiver<TelephonyMessage>,
        dial_timeout: Duration,
        missed_call_retention: usize,
    ) -> (CallHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(CallSnapshot::default());
        let service = CallService {
            machine: CallMachine::new(),
            missed: Vec::new(),
            retention: missed_call_retention,
            dial_timeout,
            outbound,
            snapshot_tx,
            dial_deadline: None,
        };
        let task = tokio::spawn(service.run(command_rx, inbound));
        let handle = CallHandle {
            commands: command_tx,
            snapshot_rx,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<CallCommand>,
        mut inbound: mpsc::Receiver<TelephonyMessage>,
    ) {
        let mut link_open = true;
        loop {
            let deadline = self.dial_deadline.map(|(_, at)| at);
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
                _ = dial_timer(deadline), if deadline.is_some() => {
                    self.on_dial_timeout().await;
                }
            }
        }
    }

    async fn on_command(&mut self, command: CallCommand) {
        match command {
            CallCommand::PlaceCall { number, reply } => {
                let result = self.place_call(number).await;
                let _ = reply.send(result);
            }
            CallCommand::Answer { reply } => {
                let result = self.answer().await;
                let _ = reply.send(result);
            }
            CallCommand::Reject { reply } => {
                let result = self.reject().await;
                let _ = reply.send(result);
            }
            CallCommand::HangUp { reply } => {
                let result = self.hang_up().await;
                let _ = reply.send(result);
            }
        }
    }

    async fn place_call(&mut self, number: String) -> Result<CallId, LinkError> {
        if self.machine.is_busy() {
            return Err(LinkError::Busy);
        }
        if !self.outbound.is_connected() {
            return Err(LinkError::LinkDown);
        }
        let id = CallId::new();
        if let Err(e) = self.apply(CallEvent::PlaceCallRequested { id, number }).await {
            // The phone never saw the dial request; fail the session
            // right away instead of letting the timer run it out.
            let _ = self.apply(CallEvent::DialFailed { id }).await;
            return Err(e);
        }
        Ok(id)
    }

    async fn answer(&mut self) -> Result<(), LinkError> {
        let id = match self.machine.session() {
            Some(s) if s.state == CallState::Ringing => s.id,
            _ => return Err(LinkError::InvalidState("no ringing call to answer".into())),
        };
        self.apply(CallEvent::AnswerRequested { id }).await
    }

    async fn reject(&mut self) -> Result<(), LinkError> {
        let id = match self.machine.session() {
            Some(s) if s.state == CallState::Ringing => s.id,
            _ => return Err(LinkError::InvalidState("no ringing call to reject".into())),
        };
        self.apply(CallEvent::RejectRequested { id }).await
    }

    async fn hang_up(&mut self) -> Result<(), LinkError> {
        let id = match self.machine.session() {
            Some(s) if matches!(s.state, CallState::Dialing | CallState::Active) => s.id,
            _ => return Err(LinkError::InvalidState("no call to hang up".into())),
        };
        self.apply(CallEvent::HangUpRequested { id }).await
    }

    async fn on_remote(&mut self, message: TelephonyMessage) {
        let event = match message {
            TelephonyMessage::Ringing {
                id,
                number,
                display_name,
            } => CallEvent::RemoteRinging {
                id,
                number,
                display_name,
            },
            TelephonyMessage::Connected { id } => CallEvent::RemoteConnected { id },
            TelephonyMessage::Ended { id, reason } => CallEvent::RemoteEnded { id, reason },
            other => {
                debug!(?other, "ignoring non-event telephony frame");
                return;
            }
        };
        if let Err(e) = self.apply(event).await {
            warn!(error = %e, "telephony signaling send failed");
        }
    }

    /// A session cannot outlive the link that carries its signaling.
    async fn on_link_closed(&mut self) {
        let active = self
            .machine
            .session()
            .filter(|s| s.state.is_busy())
            .map(|s| s.id);
        if let Some(id) = active {
            let _ = self
                .apply(CallEvent::RemoteEnded {
                    id,
                    reason: CallEndReason::Failed,
                })
                .await;
        }
    }

    async fn on_dial_timeout(&mut self) {
        if let Some((id, _)) = self.dial_deadline.take() {
            if let Err(e) = self.apply(CallEvent::DialTimedOut { id }).await {
                warn!(error = %e, "hangup for timed-out dial failed");
            }
        }
    }

    /// Runs one event through the machine and executes the produced
    /// actions. All actions run even if one fails; the first send error
    /// is returned.
    async fn apply(&mut self, event: CallEvent) -> Result<(), LinkError> {
        let machine = std::mem::take(&mut self.machine);
        let (machine, actions) = machine.on_event(Utc::now(), event);
        self.machine = machine;
        let mut first_error = Ok(());
        for action in actions {
            if let Err(e) = self.perform(action).await {
                if first_error.is_ok() {
                    first_error = Err(e);
                }
            }
        }
        self.publish();
        first_error
    }

    async fn perform(&mut self, action: CallAction) -> Result<(), LinkError> {
        match action {
            CallAction::SendPlaceCall { id, number } => {
                self.send(TelephonyMessage::PlaceCall { id, number }).await
            }
            CallAction::SendAnswer { id } => self.send(TelephonyMessage::Answer { id }).await,
            CallAction::SendReject { id } => self.send(TelephonyMessage::Reject { id }).await,
            CallAction::SendHangUp { id } => self.send(TelephonyMessage::HangUp { id }).await,
            CallAction::ArmDialTimer { id } => {
                self.dial_deadline = Some((id, Instant::now() + self.dial_timeout));
                Ok(())
            }
            CallAction::CancelDialTimer => {
                self.dial_deadline = None;
                Ok(())
            }
            CallAction::RecordMissedCall {
                number,
                display_name,
                at,
            } => {
                self.missed.insert(
                    0,
                    MissedCall {
                        number,
                        display_name,
                        missed_at: at,
                    },
                );
                self.missed.truncate(self.retention);
                Ok(())
            }
        }
    }

    async fn send(&self, message: TelephonyMessage) -> Result<(), LinkError> {
        self.outbound
            .send(Channel::Telephony, message.to_bytes()?)
            .await
    }

    fn publish(&self) {
        let snapshot = CallSnapshot {
            session: self.machine.session().cloned(),
            missed_calls: self.missed.clone(),
        };
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

async fn dial_timer(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::channels::testing::wait_for;
    use crate::transport::{MockTransport, Transport};
    use link_core::CallDirection;
    use link_types::Envelope;

    struct Rig {
        transport: MockTransport,
        inbound_tx: mpsc::Sender<TelephonyMessage>,
        handle: CallHandle,
    }

    async fn spawn_rig() -> Rig {
        spawn_rig_with(Duration::from_secs(30), 25, true).await
    }

    async fn spawn_rig_with(dial_timeout: Duration, retention: usize, connected: bool) -> Rig {
        let transport = MockTransport::new();
        if connected {
            transport.connect("phone").await.unwrap();
        }
        let outbound = Outbound::new(Arc::new(transport.clone()), Duration::from_secs(5));
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (handle, _task) = CallService::spawn(outbound, inbound_rx, dial_timeout, retention);
        Rig {
            transport,
            inbound_tx,
            handle,
        }
    }

    fn sent_telephony(transport: &MockTransport) -> Vec<TelephonyMessage> {
        transport
            .sent_messages()
            .iter()
            .filter_map(|bytes| {
                let envelope = Envelope::from_bytes(bytes).ok()?;
                if envelope.channel().ok()? != Channel::Telephony {
                    return None;
                }
                TelephonyMessage::from_bytes(&envelope.payload).ok()
            })
            .collect()
    }

    fn ringing(id: CallId, number: &str, display_name: Option<&str>) -> TelephonyMessage {
        TelephonyMessage::Ringing {
            id,
            number: number.into(),
            display_name: display_name.map(Into::into),
        }
    }

    #[tokio::test]
    async fn place_call_dials_through_the_link() {
        let rig = spawn_rig().await;

        let id = rig.handle.place_call("+15551234567").await.unwrap();

        let snapshot = rig.handle.snapshot();
        let session = snapshot.session.unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.state, CallState::Dialing);
        assert_eq!(session.direction, CallDirection::Outgoing);
        assert!(sent_telephony(&rig.transport).iter().any(|m| matches!(
            m,
            TelephonyMessage::PlaceCall { id: sent, number } if *sent == id && number == "+15551234567"
        )));
    }

    #[tokio::test]
    async fn place_call_while_busy_is_rejected() {
        let rig = spawn_rig().await;
        rig.handle.place_call("+15551111111").await.unwrap();

        let result = rig.handle.place_call("+15552222222").await;

        assert!(matches!(result, Err(LinkError::Busy)));
        let session = rig.handle.snapshot().session.unwrap();
        assert_eq!(session.remote_address, "+15551111111");
    }

    #[tokio::test]
    async fn place_call_with_link_down_fails_fast() {
        let rig = spawn_rig_with(Duration::from_secs(30), 25, false).await;

        let result = rig.handle.place_call("+15551234567").await;

        assert!(matches!(result, Err(LinkError::LinkDown)));
        assert!(rig.handle.snapshot().session.is_none());
        assert!(rig.transport.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn failed_dial_handoff_ends_the_session() {
        let rig = spawn_rig().await;
        rig.transport.fail_next_send("radio interference");

        let result = rig.handle.place_call("+15551234567").await;

        assert!(matches!(result, Err(LinkError::LinkDown)));
        let session = rig.handle.snapshot().session.unwrap();
        assert_eq!(session.state, CallState::Ended(CallEndReason::Failed));
    }

    #[tokio::test]
    async fn incoming_ring_surfaces_in_the_snapshot() {
        let rig = spawn_rig().await;
        let id = CallId::new();

        rig.inbound_tx
            .send(ringing(id, "+15559876543", Some("Dana")))
            .await
            .unwrap();

        let mut rx = rig.handle.watch();
        let snapshot = wait_for(&mut rx, |s| s.session.is_some()).await;
        let session = snapshot.session.unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.state, CallState::Ringing);
        assert_eq!(session.direction, CallDirection::Incoming);
        assert_eq!(session.remote_address, "+15559876543");
        assert_eq!(session.display_name.as_deref(), Some("Dana"));
    }

    #[tokio::test]
    async fn answer_goes_active_and_notifies_the_phone() {
        let rig = spawn_rig().await;
        let id = CallId::new();
        rig.inbound_tx
            .send(ringing(id, "+15559876543", None))
            .await
            .unwrap();
        let mut rx = rig.handle.watch();
        wait_for(&mut rx, |s| s.session.is_some()).await;

        rig.handle.answer().await.unwrap();

        let session = rig.handle.snapshot().session.unwrap();
        assert_eq!(session.state, CallState::Active);
        assert!(sent_telephony(&rig.transport)
            .iter()
            .any(|m| matches!(m, TelephonyMessage::Answer { id: sent } if *sent == id)));
    }

    #[tokio::test]
    async fn answer_without_a_ringing_call_is_invalid() {
        let rig = spawn_rig().await;

        let result = rig.handle.answer().await;

        assert!(matches!(result, Err(LinkError::InvalidState(_))));
    }

    #[tokio::test]
    async fn reject_declines_the_ringing_call() {
        let rig = spawn_rig().await;
        let id = CallId::new();
        rig.inbound_tx
            .send(ringing(id, "+15559876543", None))
            .await
            .unwrap();
        let mut rx = rig.handle.watch();
        wait_for(&mut rx, |s| s.session.is_some()).await;

        rig.handle.reject().await.unwrap();

        let session = rig.handle.snapshot().session.unwrap();
        assert_eq!(session.state, CallState::Ended(CallEndReason::Declined));
        assert!(sent_telephony(&rig.transport)
            .iter()
            .any(|m| matches!(m, TelephonyMessage::Reject { id: sent } if *sent == id)));
        assert!(rig.handle.snapshot().missed_calls.is_empty());
    }

    #[tokio::test]
    async fn second_ring_while_active_is_auto_declined_and_recorded_missed() {
        let rig = spawn_rig().await;
        let first = CallId::new();
        rig.inbound_tx
            .send(ringing(first, "+15551111111", None))
            .await
            .unwrap();
        let mut rx = rig.handle.watch();
        wait_for(&mut rx, |s| s.session.is_some()).await;
        rig.handle.answer().await.unwrap();

        let second = CallId::new();
        rig.inbound_tx
            .send(ringing(second, "+15552222222", Some("Sam")))
            .await
            .unwrap();

        let snapshot = wait_for(&mut rx, |s| !s.missed_calls.is_empty()).await;
        let session = snapshot.session.unwrap();
        assert_eq!(session.id, first);
        assert_eq!(session.state, CallState::Active);
        assert_eq!(snapshot.missed_calls[0].number, "+15552222222");
        assert_eq!(snapshot.missed_calls[0].display_name.as_deref(), Some("Sam"));

        let sent = sent_telephony(&rig.transport);
        assert!(sent
            .iter()
            .any(|m| matches!(m, TelephonyMessage::Reject { id } if *id == second)));
        assert!(!sent
            .iter()
            .any(|m| matches!(m, TelephonyMessage::Reject { id } if *id == first)));
    }

    #[tokio::test]
    async fn hang_up_ends_the_call_and_frees_the_slot() {
        let rig = spawn_rig().await;
        let first = CallId::new();
        rig.inbound_tx
            .send(ringing(first, "+15551111111", None))
            .await
            .unwrap();
        let mut rx = rig.handle.watch();
        wait_for(&mut rx, |s| s.session.is_some()).await;
        rig.handle.answer().await.unwrap();

        rig.handle.hang_up().await.unwrap();

        let session = rig.handle.snapshot().session.unwrap();
        assert_eq!(session.state, CallState::Ended(CallEndReason::HungUp));
        assert!(sent_telephony(&rig.transport)
            .iter()
            .any(|m| matches!(m, TelephonyMessage::HangUp { id } if *id == first)));

        // Terminal session no longer occupies the slot.
        let second = CallId::new();
        rig.inbound_tx
            .send(ringing(second, "+15553333333", None))
            .await
            .unwrap();
        let snapshot = wait_for(&mut rx, |s| {
            s.session.as_ref().is_some_and(|c| c.id == second)
        })
        .await;
        assert_eq!(snapshot.session.unwrap().state, CallState::Ringing);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_dial_times_out_as_failed() {
        let rig = spawn_rig().await;
        let id = rig.handle.place_call("+15551234567").await.unwrap();

        let mut rx = rig.handle.watch();
        let snapshot = wait_for(&mut rx, |s| {
            s.session.as_ref().is_some_and(|c| c.state.is_terminal())
        })
        .await;

        assert_eq!(
            snapshot.session.unwrap().state,
            CallState::Ended(CallEndReason::Failed)
        );
        assert!(sent_telephony(&rig.transport)
            .iter()
            .any(|m| matches!(m, TelephonyMessage::HangUp { id: sent } if *sent == id)));
    }

    #[tokio::test(start_paused = true)]
    async fn answered_dial_does_not_time_out() {
        let rig = spawn_rig().await;
        let id = rig.handle.place_call("+15551234567").await.unwrap();
        rig.inbound_tx
            .send(TelephonyMessage::Connected { id })
            .await
            .unwrap();
        let mut rx = rig.handle.watch();
        wait_for(&mut rx, |s| {
            s.session.as_ref().is_some_and(|c| c.state == CallState::Active)
        })
        .await;

        // Run the clock well past the dial timeout.
        tokio::time::sleep(Duration::from_secs(120)).await;

        let session = rig.handle.snapshot().session.unwrap();
        assert_eq!(session.state, CallState::Active);
    }

    #[tokio::test]
    async fn missed_calls_cap_at_retention() {
        let rig = spawn_rig_with(Duration::from_secs(30), 2, true).await;
        rig.handle.place_call("+15550000000").await.unwrap();

        for number in ["+15551111111", "+15552222222", "+15553333333"] {
            rig.inbound_tx
                .send(ringing(CallId::new(), number, None))
                .await
                .unwrap();
        }

        let mut rx = rig.handle.watch();
        let snapshot = wait_for(&mut rx, |s| {
            s.missed_calls.len() == 2 && s.missed_calls[0].number == "+15553333333"
        })
        .await;
        let numbers: Vec<&str> = snapshot
            .missed_calls
            .iter()
            .map(|m| m.number.as_str())
            .collect();
        assert_eq!(numbers, ["+15553333333", "+15552222222"]);
    }

    #[tokio::test]
    async fn ring_that_times_out_on_the_phone_is_recorded_missed() {
        let rig = spawn_rig().await;
        let id = CallId::new();
        rig.inbound_tx
            .send(ringing(id, "+15559876543", Some("Dana")))
            .await
            .unwrap();
        let mut rx = rig.handle.watch();
        wait_for(&mut rx, |s| s.session.is_some()).await;

        rig.inbound_tx
            .send(TelephonyMessage::Ended {
                id,
                reason: CallEndReason::Missed,
            })
            .await
            .unwrap();

        let snapshot = wait_for(&mut rx, |s| !s.missed_calls.is_empty()).await;
        assert_eq!(
            snapshot.session.unwrap().state,
            CallState::Ended(CallEndReason::Missed)
        );
        assert_eq!(snapshot.missed_calls[0].number, "+15559876543");
        assert_eq!(
            snapshot.missed_calls[0].display_name.as_deref(),
            Some("Dana")
        );
    }

    #[tokio::test]
    async fn link_drop_fails_the_active_call() {
        let rig = spawn_rig().await;
        let id = CallId::new();
        rig.inbound_tx
            .send(ringing(id, "+15559876543", None))
            .await
            .unwrap();
        let mut rx = rig.handle.watch();
        wait_for(&mut rx, |s| s.session.is_some()).await;
        rig.handle.answer().await.unwrap();

        drop(rig.inbound_tx);

        let snapshot = wait_for(&mut rx, |s| {
            s.session.as_ref().is_some_and(|c| c.state.is_terminal())
        })
        .await;
        assert_eq!(
            snapshot.session.unwrap().state,
            CallState::Ended(CallEndReason::Failed)
        );
    }
}
