//! Channel messages for the phonelink protocol.
//!
//! These are the per-channel payloads carried inside an [`Envelope`].
//! Each channel has its own enum; the envelope's channel tag selects
//! which enum the payload decodes as.
//!
//! [`Envelope`]: crate::Envelope

use serde::{Deserialize, Serialize};

use crate::{
    CallId, LinkError, MediaState, MirroredNotification, NotificationKey, PhoneStatus, ScheduleId,
    TransferId,
};

/// Why a call session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallEndReason {
    /// Ended from an active or dialing call
    HungUp,
    /// Rejected while ringing
    Declined,
    /// Rang out unanswered
    Missed,
    /// Call setup failed
    Failed,
    /// The phone side ended the call
    Remote,
}

/// Messages on the status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatusMessage {
    /// Full device status snapshot; replaces the previous one
    Update(PhoneStatus),
    /// Liveness ping carrying no status
    Heartbeat,
}

impl StatusMessage {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LinkError> {
        rmp_serde::to_vec(self).map_err(LinkError::Encode)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        rmp_serde::from_slice(bytes).map_err(LinkError::Decode)
    }
}

/// Messages on the telephony channel.
///
/// `Ringing`/`Connected`/`Ended` flow phone to desktop; the rest are
/// desktop-issued commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TelephonyMessage {
    /// An incoming call started ringing on the phone
    Ringing {
        /// Phone-assigned session id
        id: CallId,
        /// Caller number
        number: String,
        /// Contact name, if the phone resolved one
        display_name: Option<String>,
    },
    /// A call went active (answered, or outgoing pickup)
    Connected {
        /// Session id
        id: CallId,
    },
    /// A call reached a terminal state on the phone
    Ended {
        /// Session id
        id: CallId,
        /// Terminal reason
        reason: CallEndReason,
    },
    /// Ask the phone to dial a number
    PlaceCall {
        /// Desktop-assigned session id
        id: CallId,
        /// Number to dial
        number: String,
    },
    /// Answer the ringing call
    Answer {
        /// Session id
        id: CallId,
    },
    /// Reject the ringing call
    Reject {
        /// Session id
        id: CallId,
    },
    /// End the dialing or active call
    HangUp {
        /// Session id
        id: CallId,
    },
}

impl TelephonyMessage {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LinkError> {
        rmp_serde::to_vec(self).map_err(LinkError::Encode)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        rmp_serde::from_slice(bytes).map_err(LinkError::Decode)
    }
}

/// Messages on the messaging channel.
///
/// The desktop sends `Send`; the phone answers with `SendResult` carrying
/// the same `request_id`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessagingMessage {
    /// Dispatch an SMS through the phone
    Send {
        /// Correlation id, echoed in the result
        request_id: ScheduleId,
        /// Recipient number
        to: String,
        /// Message body
        body: String,
    },
    /// Phone's verdict on a send request
    SendResult {
        /// Correlation id from the request
        request_id: ScheduleId,
        /// Whether the phone accepted and sent the message
        accepted: bool,
        /// Failure detail when not accepted
        error: Option<String>,
    },
}

impl MessagingMessage {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LinkError> {
        rmp_serde::to_vec(self).map_err(LinkError::Encode)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        rmp_serde::from_slice(bytes).map_err(LinkError::Decode)
    }
}

impl std::fmt::Debug for MessagingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessagingMessage::Send { request_id, to, .. } => f
                .debug_struct("Send")
                .field("request_id", request_id)
                .field("to", to)
                .field("body", &"[REDACTED]")
                .finish(),
            MessagingMessage::SendResult {
                request_id,
                accepted,
                error,
            } => f
                .debug_struct("SendResult")
                .field("request_id", request_id)
                .field("accepted", accepted)
                .field("error", error)
                .finish(),
        }
    }
}

/// Messages on the transfer channel.
///
/// The sending side emits `Begin`, `Chunk` frames in `seq` order, then
/// `Complete`. Either side may emit `Failed` to abort.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransferMessage {
    /// Announce a new file transfer
    Begin {
        /// Transfer id
        id: TransferId,
        /// File name (no directories)
        file_name: String,
        /// Total size in bytes
        size: u64,
    },
    /// One slice of file content
    Chunk {
        /// Transfer id
        id: TransferId,
        /// Zero-based chunk index
        seq: u64,
        /// Raw bytes
        data: Vec<u8>,
    },
    /// All chunks sent; the file is whole
    Complete {
        /// Transfer id
        id: TransferId,
    },
    /// The sending side aborted
    Failed {
        /// Transfer id
        id: TransferId,
        /// What went wrong
        error: String,
    },
}

impl TransferMessage {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LinkError> {
        rmp_serde::to_vec(self).map_err(LinkError::Encode)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        rmp_serde::from_slice(bytes).map_err(LinkError::Decode)
    }
}

impl std::fmt::Debug for TransferMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferMessage::Begin {
                id,
                file_name,
                size,
            } => f
                .debug_struct("Begin")
                .field("id", id)
                .field("file_name", file_name)
                .field("size", size)
                .finish(),
            TransferMessage::Chunk { id, seq, data } => f
                .debug_struct("Chunk")
                .field("id", id)
                .field("seq", seq)
                .field("data", &format_args!("[{} bytes]", data.len()))
                .finish(),
            TransferMessage::Complete { id } => {
                f.debug_struct("Complete").field("id", id).finish()
            }
            TransferMessage::Failed { id, error } => f
                .debug_struct("Failed")
                .field("id", id)
                .field("error", error)
                .finish(),
        }
    }
}

/// Messages on the notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationMessage {
    /// The phone posted or updated a notification
    Posted(MirroredNotification),
    /// The phone dismissed a notification on its side
    Dismissed {
        /// Phone-side key
        id: NotificationKey,
    },
    /// Ask the phone to clear a notification
    Dismiss {
        /// Phone-side key
        id: NotificationKey,
    },
}

impl NotificationMessage {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LinkError> {
        rmp_serde::to_vec(self).map_err(LinkError::Encode)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        rmp_serde::from_slice(bytes).map_err(LinkError::Decode)
    }
}

/// Messages on the media channel.
///
/// Commands are one-shot; the phone answers with a `State` push when
/// playback actually changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MediaMessage {
    /// Full playback snapshot; replaces the previous one
    State(MediaState),
    /// Toggle play/pause
    PlayPause,
    /// Skip to the next track
    Next,
    /// Return to the previous track
    Previous,
    /// Set the media volume
    SetVolume {
        /// Target volume, already clamped by the sender
        volume: u32,
    },
}

impl MediaMessage {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LinkError> {
        rmp_serde::to_vec(self).map_err(LinkError::Encode)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        rmp_serde::from_slice(bytes).map_err(LinkError::Decode)
    }
}
