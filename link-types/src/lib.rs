//! # link-types
//!
//! Wire format types for the phonelink device link protocol.
//!
//! This crate provides the foundational types used across all phonelink
//! crates:
//! - [`CallId`], [`TransferId`], [`ScheduleId`], [`NotificationKey`] - Identity types
//! - [`Envelope`], [`Channel`] - Message wrapper with channel routing
//! - [`StatusMessage`], [`TelephonyMessage`], [`MessagingMessage`],
//!   [`TransferMessage`], [`NotificationMessage`], [`MediaMessage`] - Per-channel payloads
//! - [`PhoneStatus`], [`LinkStatus`], [`MediaState`], [`MirroredNotification`] - Status snapshots
//! - [`LinkError`] - Error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod messages;
mod status;

pub use envelope::{Channel, Envelope, PROTOCOL_VERSION};
pub use error::LinkError;
pub use ids::{CallId, NotificationKey, ScheduleId, TransferId};
pub use messages::{
    CallEndReason, MediaMessage, MessagingMessage, NotificationMessage, StatusMessage,
    TelephonyMessage, TransferMessage,
};
pub use status::{LinkStatus, MediaState, MirroredNotification, PhoneStatus};
