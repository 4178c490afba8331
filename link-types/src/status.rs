//! Shared status snapshots pushed by the phone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::NotificationKey;

/// Device status reported by the phone on the status channel.
///
/// Replaced wholesale on every status push; individual fields are never
/// patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneStatus {
    /// Human-readable device name
    pub device_name: String,
    /// Battery percentage, 0-100
    pub battery_level: u8,
    /// Whether the phone is on a charger
    pub is_charging: bool,
    /// Whether wifi is connected
    pub wifi_connected: bool,
    /// SSID of the connected network, if any
    pub wifi_ssid: Option<String>,
    /// Whether cellular data is connected
    pub cellular_connected: bool,
    /// Cellular network type ("LTE", "5G", ...)
    pub network_type: Option<String>,
    /// Signal bars, 0-4
    pub signal_strength: u8,
}

/// The link's view of the paired device.
///
/// Mutated only by the dispatcher on transport events. `phone` is `None`
/// until the first status push and again after disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LinkStatus {
    /// Whether the transport currently reports a live connection
    pub connected: bool,
    /// Latest status snapshot from the phone
    pub phone: Option<PhoneStatus>,
}

impl LinkStatus {
    /// Status for a link with no connection.
    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// Remote playback state pushed by the phone on the media channel.
///
/// Single snapshot, last write wins. Commands never update this locally;
/// only an inbound push does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaState {
    /// Whether something is playing right now
    pub is_playing: bool,
    /// Current track title
    pub track_title: Option<String>,
    /// Current track artist
    pub track_artist: Option<String>,
    /// Current track album
    pub track_album: Option<String>,
    /// Name of the app playing ("Spotify")
    pub track_app_name: Option<String>,
    /// Package of the app playing ("com.spotify.music")
    pub track_package_name: Option<String>,
    /// Current media volume
    pub volume: u32,
    /// Maximum media volume on this device
    pub max_volume: u32,
    /// Whether the phone has granted notification-listener access
    pub has_phone_permission: bool,
}

impl MediaState {
    /// Clamp a requested volume into this device's valid range.
    pub fn clamp_volume(&self, requested: u32) -> u32 {
        requested.min(self.max_volume)
    }
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            is_playing: false,
            track_title: None,
            track_artist: None,
            track_album: None,
            track_app_name: None,
            track_package_name: None,
            volume: 0,
            max_volume: 15,
            has_phone_permission: false,
        }
    }
}

/// A notification mirrored from the phone.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirroredNotification {
    /// Phone-side notification key; dedupe and dismissal handle
    pub id: NotificationKey,
    /// Name of the posting app
    pub app_name: String,
    /// Notification title
    pub title: String,
    /// Notification body text
    pub text: String,
    /// App icon as base64 PNG, if the phone sent one
    pub app_icon: Option<String>,
    /// Phone-side post time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub posted_at: DateTime<Utc>,
}

impl MirroredNotification {
    /// Decode the app icon to raw PNG bytes.
    ///
    /// Returns `None` when there is no icon or it is not valid base64.
    pub fn icon_bytes(&self) -> Option<Vec<u8>> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        self.app_icon.as_ref().and_then(|s| STANDARD.decode(s).ok())
    }
}

impl std::fmt::Debug for MirroredNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirroredNotification")
            .field("id", &self.id)
            .field("app_name", &self.app_name)
            .field("title", &self.title)
            .field("text", &"[REDACTED]")
            .field("posted_at", &self.posted_at)
            .finish()
    }
}
