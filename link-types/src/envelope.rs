//! Envelope - the wire format wrapper for all link messages.

use serde::{Deserialize, Serialize};

use crate::LinkError;

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Channel discriminator for envelope routing.
///
/// Each mirrored capability is multiplexed over the link as its own
/// channel. New channels get new tags; old desktops drop tags they do
/// not recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Channel {
    /// Connectivity and phone status (battery, network)
    Status = 1,
    /// Call signaling
    Telephony = 2,
    /// Outbound SMS dispatch
    Messaging = 3,
    /// File transfer frames
    Transfer = 4,
    /// Mirrored notifications and dismissals
    Notifications = 5,
    /// Playback state and remote control
    Media = 6,
}

impl TryFrom<u8> for Channel {
    type Error = LinkError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Channel::Status),
            2 => Ok(Channel::Telephony),
            3 => Ok(Channel::Messaging),
            4 => Ok(Channel::Transfer),
            5 => Ok(Channel::Notifications),
            6 => Ok(Channel::Media),
            _ => Err(LinkError::UnknownChannel(value)),
        }
    }
}

/// The envelope wraps every channel payload with routing metadata.
///
/// The channel tag is stored as a raw `u8` so an envelope from a newer
/// phone still decodes; unknown tags surface through [`Envelope::channel`]
/// and are dropped by the dispatcher rather than failing the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version (currently 1)
    pub version: u8,
    /// Channel discriminator
    pub channel: u8,
    /// MessagePack-encoded channel message
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create a new envelope for sending.
    pub fn new(channel: Channel, payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            channel: channel as u8,
            payload,
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LinkError> {
        rmp_serde::to_vec(self).map_err(LinkError::Encode)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        rmp_serde::from_slice(bytes).map_err(LinkError::Decode)
    }

    /// Get the channel as an enum.
    pub fn channel(&self) -> Result<Channel, LinkError> {
        Channel::try_from(self.channel)
    }
}
