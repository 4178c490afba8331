//! Call session state machine for phonelink.
//!
//! This module provides a pure, side-effect-free state machine for the
//! single-call invariant: at most one session is ever ringing or active.
//! The machine takes events as input and produces a new state plus a list
//! of actions to execute.
//!
//! The actual I/O (sending signaling messages, arming the dial timer) is
//! performed by link-desktop, not by this module. This enables instant
//! unit testing without transport mocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use link_types::{CallEndReason, CallId};

/// Which side originated the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// The phone received the call
    Incoming,
    /// The desktop asked the phone to dial
    Outgoing,
}

/// Lifecycle state of one call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    /// Incoming call, not yet answered
    Ringing,
    /// Outgoing call, waiting for pickup
    Dialing,
    /// Call in progress
    Active,
    /// Terminal; the slot is free for the next call
    Ended(CallEndReason),
}

impl CallState {
    /// Whether this state occupies the single-call slot.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Ringing | Self::Dialing | Self::Active)
    }

    /// Whether this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended(_))
    }
}

/// One call session, created on a telephony event and terminal once ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    /// Session id shared with the phone
    pub id: CallId,
    /// The other party's number
    pub remote_address: String,
    /// Contact name, if resolved
    pub display_name: Option<String>,
    /// Who originated the call
    pub direction: CallDirection,
    /// Current lifecycle state
    pub state: CallState,
    /// When the session was created locally
    pub started_at: DateTime<Utc>,
}

/// Call state machine - NO I/O, just state transitions.
///
/// Holds the single session slot. A terminal session stays visible until
/// the next call replaces it; only ringing/dialing/active sessions make
/// the slot busy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallMachine {
    session: Option<CallSession>,
}

impl CallMachine {
    /// Create a machine with no session.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current session, terminal or not.
    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    /// Whether a session currently occupies the slot.
    pub fn is_busy(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.state.is_busy())
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (link-desktop)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, now: DateTime<Utc>, event: CallEvent) -> (Self, Vec<CallAction>) {
        let busy = self.is_busy();
        match (self.session, event) {
            // Local dial request into a free slot. The caller checks
            // is_busy() first; the guard keeps the invariant even if it
            // does not, falling through to the no-op arm.
            (_, CallEvent::PlaceCallRequested { id, number }) if !busy => {
                let session = CallSession {
                    id,
                    remote_address: number.clone(),
                    display_name: None,
                    direction: CallDirection::Outgoing,
                    state: CallState::Dialing,
                    started_at: now,
                };
                (
                    Self {
                        session: Some(session),
                    },
                    vec![
                        CallAction::SendPlaceCall { id, number },
                        CallAction::ArmDialTimer { id },
                    ],
                )
            }

            // Incoming ring into a free slot
            (_, CallEvent::RemoteRinging {
                id,
                number,
                display_name,
            }) if !busy => {
                let session = CallSession {
                    id,
                    remote_address: number,
                    display_name,
                    direction: CallDirection::Incoming,
                    state: CallState::Ringing,
                    started_at: now,
                };
                (
                    Self {
                        session: Some(session),
                    },
                    vec![],
                )
            }

            // Incoming ring while another call holds the slot: auto-decline.
            // The new call never enters Ringing; it is surfaced as missed.
            (session, CallEvent::RemoteRinging {
                id,
                number,
                display_name,
            }) => (
                Self { session },
                vec![
                    CallAction::SendReject { id },
                    CallAction::RecordMissedCall {
                        number,
                        display_name,
                        at: now,
                    },
                ],
            ),

            (Some(mut s), CallEvent::AnswerRequested { id })
                if s.id == id && s.state == CallState::Ringing =>
            {
                s.state = CallState::Active;
                (Self { session: Some(s) }, vec![CallAction::SendAnswer { id }])
            }

            (Some(mut s), CallEvent::RejectRequested { id })
                if s.id == id && s.state == CallState::Ringing =>
            {
                s.state = CallState::Ended(CallEndReason::Declined);
                (Self { session: Some(s) }, vec![CallAction::SendReject { id }])
            }

            // Hangup is optimistic: local state ends now, the phone is told
            // after the fact. A late remote Ended for the same id lands on a
            // terminal session and is ignored.
            (Some(mut s), CallEvent::HangUpRequested { id })
                if s.id == id && matches!(s.state, CallState::Dialing | CallState::Active) =>
            {
                let was_dialing = s.state == CallState::Dialing;
                s.state = CallState::Ended(CallEndReason::HungUp);
                let mut actions = vec![CallAction::SendHangUp { id }];
                if was_dialing {
                    actions.push(CallAction::CancelDialTimer);
                }
                (Self { session: Some(s) }, actions)
            }

            (Some(mut s), CallEvent::RemoteConnected { id })
                if s.id == id && s.state == CallState::Dialing =>
            {
                s.state = CallState::Active;
                (Self { session: Some(s) }, vec![CallAction::CancelDialTimer])
            }

            (Some(mut s), CallEvent::RemoteEnded { id, reason })
                if s.id == id && s.state.is_busy() =>
            {
                let was_dialing = s.state == CallState::Dialing;
                s.state = CallState::Ended(reason);
                let mut actions = Vec::new();
                if was_dialing {
                    actions.push(CallAction::CancelDialTimer);
                }
                if reason == CallEndReason::Missed {
                    actions.push(CallAction::RecordMissedCall {
                        number: s.remote_address.clone(),
                        display_name: s.display_name.clone(),
                        at: now,
                    });
                }
                (Self { session: Some(s) }, actions)
            }

            (Some(mut s), CallEvent::DialTimedOut { id })
                if s.id == id && s.state == CallState::Dialing =>
            {
                s.state = CallState::Ended(CallEndReason::Failed);
                (
                    Self { session: Some(s) },
                    vec![CallAction::SendHangUp { id }],
                )
            }

            // The dial never reached the phone, so there is nothing to
            // hang up; the session just fails.
            (Some(mut s), CallEvent::DialFailed { id })
                if s.id == id && s.state == CallState::Dialing =>
            {
                s.state = CallState::Ended(CallEndReason::Failed);
                (Self { session: Some(s) }, vec![CallAction::CancelDialTimer])
            }

            // Invalid transitions - stay in current state
            (session, _) => (Self { session }, vec![]),
        }
    }
}

/// Events that can occur in the call lifecycle.
///
/// `*Requested` events are local operations; `Remote*` events arrive from
/// the phone; `DialTimedOut` and `DialFailed` come from the desktop side
/// of an outgoing dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// Desktop wants to dial a number.
    PlaceCallRequested {
        /// Pre-allocated session id.
        id: CallId,
        /// Number to dial.
        number: String,
    },
    /// Desktop answers the ringing call.
    AnswerRequested {
        /// Session id the user acted on.
        id: CallId,
    },
    /// Desktop rejects the ringing call.
    RejectRequested {
        /// Session id the user acted on.
        id: CallId,
    },
    /// Desktop ends the dialing or active call.
    HangUpRequested {
        /// Session id the user acted on.
        id: CallId,
    },
    /// The phone reports an incoming call ringing.
    RemoteRinging {
        /// Phone-assigned session id.
        id: CallId,
        /// Caller number.
        number: String,
        /// Contact name, if resolved.
        display_name: Option<String>,
    },
    /// The phone reports the call went active.
    RemoteConnected {
        /// Session id.
        id: CallId,
    },
    /// The phone reports the call ended.
    RemoteEnded {
        /// Session id.
        id: CallId,
        /// Terminal reason.
        reason: CallEndReason,
    },
    /// The dial timer fired before the phone confirmed pickup.
    DialTimedOut {
        /// Session id the timer was armed for.
        id: CallId,
    },
    /// The dial request could not be handed to the phone at all.
    DialFailed {
        /// Session id of the failed dial.
        id: CallId,
    },
}

/// Actions to be executed by link-desktop.
///
/// These are instructions, not side effects. The service interprets them
/// and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAction {
    /// Send a dial request to the phone.
    SendPlaceCall {
        /// Session id.
        id: CallId,
        /// Number to dial.
        number: String,
    },
    /// Send an answer to the phone.
    SendAnswer {
        /// Session id.
        id: CallId,
    },
    /// Send a reject to the phone.
    SendReject {
        /// Session id.
        id: CallId,
    },
    /// Send a hangup to the phone.
    SendHangUp {
        /// Session id.
        id: CallId,
    },
    /// Start the dial timeout for an outgoing call.
    ArmDialTimer {
        /// Session id the timer belongs to.
        id: CallId,
    },
    /// Cancel any pending dial timer.
    CancelDialTimer,
    /// Surface a call the user did not get to take.
    RecordMissedCall {
        /// Caller number.
        number: String,
        /// Contact name, if resolved.
        display_name: Option<String>,
        /// When it was missed.
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn ringing_machine(id: CallId) -> CallMachine {
        let (machine, _) = CallMachine::new().on_event(
            now(),
            CallEvent::RemoteRinging {
                id,
                number: "+15551234567".into(),
                display_name: Some("Ada".into()),
            },
        );
        machine
    }

    fn active_machine(id: CallId) -> CallMachine {
        let (machine, _) = ringing_machine(id).on_event(now(), CallEvent::AnswerRequested { id });
        machine
    }

    #[test]
    fn starts_with_no_session() {
        let machine = CallMachine::new();
        assert!(machine.session().is_none());
        assert!(!machine.is_busy());
    }

    #[test]
    fn place_call_enters_dialing_and_arms_timer() {
        let id = CallId::new();
        let (machine, actions) = CallMachine::new().on_event(
            now(),
            CallEvent::PlaceCallRequested {
                id,
                number: "+15551234567".into(),
            },
        );

        let session = machine.session().unwrap();
        assert_eq!(session.state, CallState::Dialing);
        assert_eq!(session.direction, CallDirection::Outgoing);
        assert!(machine.is_busy());
        assert!(actions
            .iter()
            .any(|a| matches!(a, CallAction::SendPlaceCall { .. })));
        assert!(actions
            .iter()
            .any(|a| matches!(a, CallAction::ArmDialTimer { .. })));
    }

    #[test]
    fn place_call_while_busy_is_ignored() {
        let id = CallId::new();
        let machine = active_machine(id);
        let (machine, actions) = machine.on_event(
            now(),
            CallEvent::PlaceCallRequested {
                id: CallId::new(),
                number: "+15559990000".into(),
            },
        );

        assert_eq!(machine.session().unwrap().id, id);
        assert!(actions.is_empty());
    }

    #[test]
    fn remote_ringing_creates_incoming_session() {
        let id = CallId::new();
        let machine = ringing_machine(id);

        let session = machine.session().unwrap();
        assert_eq!(session.state, CallState::Ringing);
        assert_eq!(session.direction, CallDirection::Incoming);
        assert_eq!(session.display_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn second_ring_while_active_is_auto_declined() {
        let first = CallId::new();
        let machine = active_machine(first);

        let second = CallId::new();
        let (machine, actions) = machine.on_event(
            now(),
            CallEvent::RemoteRinging {
                id: second,
                number: "+15550001111".into(),
                display_name: None,
            },
        );

        // The active session is untouched; the new call never rings.
        let session = machine.session().unwrap();
        assert_eq!(session.id, first);
        assert_eq!(session.state, CallState::Active);
        assert!(actions
            .iter()
            .any(|a| matches!(a, CallAction::SendReject { id } if *id == second)));
        assert!(actions.iter().any(|a| matches!(
            a,
            CallAction::RecordMissedCall { number, .. } if number == "+15550001111"
        )));
    }

    #[test]
    fn second_ring_while_ringing_is_auto_declined() {
        let first = CallId::new();
        let machine = ringing_machine(first);

        let (machine, actions) = machine.on_event(
            now(),
            CallEvent::RemoteRinging {
                id: CallId::new(),
                number: "+15550002222".into(),
                display_name: None,
            },
        );

        assert_eq!(machine.session().unwrap().id, first);
        assert!(actions
            .iter()
            .any(|a| matches!(a, CallAction::SendReject { .. })));
    }

    #[test]
    fn answer_moves_ringing_to_active() {
        let id = CallId::new();
        let (machine, actions) =
            ringing_machine(id).on_event(now(), CallEvent::AnswerRequested { id });

        assert_eq!(machine.session().unwrap().state, CallState::Active);
        assert!(actions
            .iter()
            .any(|a| matches!(a, CallAction::SendAnswer { .. })));
    }

    #[test]
    fn answer_outside_ringing_is_a_noop() {
        let id = CallId::new();
        let machine = active_machine(id);
        let (machine, actions) = machine.on_event(now(), CallEvent::AnswerRequested { id });

        assert_eq!(machine.session().unwrap().state, CallState::Active);
        assert!(actions.is_empty());
    }

    #[test]
    fn answer_with_stale_id_is_a_noop() {
        let id = CallId::new();
        let machine = ringing_machine(id);
        let (machine, actions) =
            machine.on_event(now(), CallEvent::AnswerRequested { id: CallId::new() });

        assert_eq!(machine.session().unwrap().state, CallState::Ringing);
        assert!(actions.is_empty());
    }

    #[test]
    fn reject_declines_ringing_call() {
        let id = CallId::new();
        let (machine, actions) =
            ringing_machine(id).on_event(now(), CallEvent::RejectRequested { id });

        assert_eq!(
            machine.session().unwrap().state,
            CallState::Ended(CallEndReason::Declined)
        );
        assert!(!machine.is_busy());
        assert!(actions
            .iter()
            .any(|a| matches!(a, CallAction::SendReject { .. })));
    }

    #[test]
    fn hangup_ends_active_call_locally_first() {
        let id = CallId::new();
        let (machine, actions) =
            active_machine(id).on_event(now(), CallEvent::HangUpRequested { id });

        assert_eq!(
            machine.session().unwrap().state,
            CallState::Ended(CallEndReason::HungUp)
        );
        assert!(actions
            .iter()
            .any(|a| matches!(a, CallAction::SendHangUp { .. })));
    }

    #[test]
    fn hangup_while_dialing_cancels_timer() {
        let id = CallId::new();
        let (machine, _) = CallMachine::new().on_event(
            now(),
            CallEvent::PlaceCallRequested {
                id,
                number: "+15551234567".into(),
            },
        );
        let (machine, actions) = machine.on_event(now(), CallEvent::HangUpRequested { id });

        assert_eq!(
            machine.session().unwrap().state,
            CallState::Ended(CallEndReason::HungUp)
        );
        assert!(actions
            .iter()
            .any(|a| matches!(a, CallAction::CancelDialTimer)));
    }

    #[test]
    fn late_remote_ended_after_hangup_is_ignored() {
        let id = CallId::new();
        let (machine, _) = active_machine(id).on_event(now(), CallEvent::HangUpRequested { id });
        let (machine, actions) = machine.on_event(
            now(),
            CallEvent::RemoteEnded {
                id,
                reason: CallEndReason::HungUp,
            },
        );

        assert_eq!(
            machine.session().unwrap().state,
            CallState::Ended(CallEndReason::HungUp)
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn dial_connects_on_remote_confirmation() {
        let id = CallId::new();
        let (machine, _) = CallMachine::new().on_event(
            now(),
            CallEvent::PlaceCallRequested {
                id,
                number: "+15551234567".into(),
            },
        );
        let (machine, actions) = machine.on_event(now(), CallEvent::RemoteConnected { id });

        assert_eq!(machine.session().unwrap().state, CallState::Active);
        assert!(actions
            .iter()
            .any(|a| matches!(a, CallAction::CancelDialTimer)));
    }

    #[test]
    fn dial_timeout_fails_the_call() {
        let id = CallId::new();
        let (machine, _) = CallMachine::new().on_event(
            now(),
            CallEvent::PlaceCallRequested {
                id,
                number: "+15551234567".into(),
            },
        );
        let (machine, actions) = machine.on_event(now(), CallEvent::DialTimedOut { id });

        assert_eq!(
            machine.session().unwrap().state,
            CallState::Ended(CallEndReason::Failed)
        );
        assert!(!machine.is_busy());
        assert!(actions
            .iter()
            .any(|a| matches!(a, CallAction::SendHangUp { .. })));
    }

    #[test]
    fn failed_dial_handoff_ends_the_call_without_hangup() {
        let id = CallId::new();
        let (machine, _) = CallMachine::new().on_event(
            now(),
            CallEvent::PlaceCallRequested {
                id,
                number: "+15551234567".into(),
            },
        );
        let (machine, actions) = machine.on_event(now(), CallEvent::DialFailed { id });

        assert_eq!(
            machine.session().unwrap().state,
            CallState::Ended(CallEndReason::Failed)
        );
        assert!(actions
            .iter()
            .any(|a| matches!(a, CallAction::CancelDialTimer)));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, CallAction::SendHangUp { .. })));
    }

    #[test]
    fn stale_dial_timeout_after_connect_is_ignored() {
        let id = CallId::new();
        let (machine, _) = CallMachine::new().on_event(
            now(),
            CallEvent::PlaceCallRequested {
                id,
                number: "+15551234567".into(),
            },
        );
        let (machine, _) = machine.on_event(now(), CallEvent::RemoteConnected { id });
        let (machine, actions) = machine.on_event(now(), CallEvent::DialTimedOut { id });

        assert_eq!(machine.session().unwrap().state, CallState::Active);
        assert!(actions.is_empty());
    }

    #[test]
    fn missed_call_recorded_when_ring_times_out_on_phone() {
        let id = CallId::new();
        let machine = ringing_machine(id);
        let (machine, actions) = machine.on_event(
            now(),
            CallEvent::RemoteEnded {
                id,
                reason: CallEndReason::Missed,
            },
        );

        assert_eq!(
            machine.session().unwrap().state,
            CallState::Ended(CallEndReason::Missed)
        );
        assert!(actions.iter().any(|a| matches!(
            a,
            CallAction::RecordMissedCall { number, .. } if number == "+15551234567"
        )));
    }

    #[test]
    fn terminal_session_frees_the_slot_for_the_next_call() {
        let id = CallId::new();
        let (machine, _) = ringing_machine(id).on_event(now(), CallEvent::RejectRequested { id });
        assert!(!machine.is_busy());

        let next = CallId::new();
        let (machine, _) = machine.on_event(
            now(),
            CallEvent::RemoteRinging {
                id: next,
                number: "+15553334444".into(),
                display_name: None,
            },
        );

        let session = machine.session().unwrap();
        assert_eq!(session.id, next);
        assert_eq!(session.state, CallState::Ringing);
    }

    #[test]
    fn at_most_one_session_ever_rings_or_actives() {
        // Drive a busy machine through a burst of competing events and
        // verify the slot never holds a second ringing/active session.
        let first = CallId::new();
        let mut machine = active_machine(first);

        for _ in 0..5 {
            let (next, _) = machine.clone().on_event(
                now(),
                CallEvent::RemoteRinging {
                    id: CallId::new(),
                    number: "+15550009999".into(),
                    display_name: None,
                },
            );
            machine = next;
            let session = machine.session().unwrap();
            assert_eq!(session.id, first);
            assert!(session.state.is_busy());
        }
    }
}
