//! # link-core
//!
//! Pure logic for phonelink (no I/O, instant tests).
//!
//! This crate implements the state machines and records for the device
//! link without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (transport, timers, disk) is performed by `link-desktop`,
//! which interprets the actions produced by these state machines. Clocks are
//! passed in as arguments for the same reason.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call;
pub mod notify;
pub mod schedule;
pub mod transfer;

pub use call::{CallAction, CallDirection, CallEvent, CallMachine, CallSession, CallState};
pub use notify::{Ingest, NotificationLog};
pub use schedule::{next_due_at, ScheduleStatus, ScheduledMessage};
pub use transfer::{Transfer, TransferDirection, TransferState};
