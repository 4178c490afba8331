//! # link-desktop
//!
//! Desktop runtime for the phonelink device link.
//!
//! This crate turns the pure state machines of `link-core` into a
//! running system:
//! - [`Transport`] - pluggable connection to the phone, with
//!   [`MockTransport`] for tests and demos
//! - [`Dispatcher`] / [`Outbound`] - one inbound pump routing frames to
//!   channel services, one shared sending half
//! - Channel services - calls, scheduled messages, file transfers,
//!   notifications, media, each owning its state and publishing
//!   snapshots over `watch` channels
//! - [`LinkStore`] - persistence for schedules and notification history
//!   ([`SqliteStore`] in production, [`MemoryStore`] in tests)
//! - [`DeviceLink`] - wires all of the above from a [`LinkConfig`]
//!
//! Nothing in here is global: construct a [`DeviceLink`] and hand its
//! handles to whoever needs them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
mod link;
pub mod storage;
pub mod transport;

pub use channels::{
    CallHandle, CallSnapshot, MediaHandle, MissedCall, NotificationHandle, NotificationSnapshot,
    ScheduleHandle, TransferHandle,
};
pub use config::{ConfigError, LinkConfig};
pub use dispatch::{ChannelRouter, Dispatcher, Outbound};
pub use error::{StoreError, StoreResult};
pub use link::DeviceLink;
pub use storage::{LinkStore, MemoryStore, SqliteStore};
pub use transport::{MockTransport, Transport, TransportError};
