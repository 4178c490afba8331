//! Per-channel services.
//!
//! Each mirrored capability runs as its own task: the dispatcher feeds it
//! decoded frames over an mpsc channel, handles feed it commands, and it
//! publishes its observable state through a `watch` channel. The task is
//! the only writer of that state.

pub mod call;
pub mod media;
pub mod notify;
pub mod schedule;
pub mod transfer;

pub use call::{CallHandle, CallSnapshot, MissedCall};
pub use media::MediaHandle;
pub use notify::{NotificationHandle, NotificationSnapshot};
pub use schedule::ScheduleHandle;
pub use transfer::TransferHandle;
