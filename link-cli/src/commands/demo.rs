//! Scripted end-to-end session against a simulated phone.
//!
//! The phone side is played over the mock transport: the script pushes
//! the frames a real phone would send and watches the frames the
//! desktop sends back, printing what each channel sees along the way.
//! Covers status, calls, notifications, media, scheduled messages,
//! file transfer in both directions, and a dropped link.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};

use link_core::{CallState, ScheduleStatus, TransferState};
use link_desktop::{DeviceLink, LinkConfig, MemoryStore, MockTransport, Transport};
use link_types::{
    CallEndReason, CallId, Channel, Envelope, MediaMessage, MediaState, MessagingMessage,
    MirroredNotification, NotificationKey, NotificationMessage, PhoneStatus, StatusMessage,
    TelephonyMessage, TransferId, TransferMessage,
};

/// Run the demo.
pub async fn run(mut config: LinkConfig) -> Result<()> {
    // Keep demo artifacts out of the real download directory, and use a
    // small chunk size so the transfers visibly stream.
    let scratch = std::env::temp_dir().join("phonelink-demo");
    config.download_dir = scratch.join("downloads");
    config.transfer_chunk_bytes = 1024;

    let transport = MockTransport::new();
    transport
        .connect("demo-phone")
        .await
        .context("Failed to open the mock link")?;

    let link = DeviceLink::start(
        config,
        Arc::new(transport.clone()),
        Arc::new(MemoryStore::new()),
    );
    let mut phone = SimulatedPhone::new(transport);

    println!("=== phonelink demo ===");
    println!();

    status_scene(&link, &phone).await?;
    call_scene(&link, &mut phone).await?;
    notification_scene(&link, &mut phone).await?;
    media_scene(&link, &mut phone).await?;
    schedule_scene(&link, &mut phone).await?;
    download_scene(&link, &mut phone).await?;
    upload_scene(&link, &mut phone, &scratch).await?;
    disconnect_scene(&link, &phone).await?;

    link.shutdown().await;

    println!();
    println!("Demo complete.");
    Ok(())
}

/// The phone reports itself; the desktop learns who is on the link.
async fn status_scene(link: &DeviceLink, phone: &SimulatedPhone) -> Result<()> {
    let status = PhoneStatus {
        device_name: "Pixel 8".into(),
        battery_level: 82,
        is_charging: false,
        wifi_connected: true,
        wifi_ssid: Some("office-5g".into()),
        cellular_connected: true,
        network_type: Some("LTE".into()),
        signal_strength: 3,
    };
    phone.push(Channel::Status, StatusMessage::Update(status).to_bytes()?)?;

    let mut status_rx = link.status();
    let seen = settle(&mut status_rx, "the first status report", |s| s.connected).await?;
    let report = seen.phone.context("Connected status carries no phone report")?;

    println!("[status] {} connected", report.device_name);
    println!("  Battery: {}%", report.battery_level);
    if let Some(ssid) = &report.wifi_ssid {
        println!("  Wifi:    {ssid}");
    }
    if let Some(network) = &report.network_type {
        println!("  Mobile:  {network} ({} bars)", report.signal_strength);
    }
    println!();
    Ok(())
}

/// An incoming call, answered from the desktop, ended by the phone.
async fn call_scene(link: &DeviceLink, phone: &mut SimulatedPhone) -> Result<()> {
    let calls = link.calls();
    let mut calls_rx = calls.watch();

    let call_id = CallId::new();
    phone.push(
        Channel::Telephony,
        TelephonyMessage::Ringing {
            id: call_id,
            number: "+15550182".into(),
            display_name: Some("Dana Hart".into()),
        }
        .to_bytes()?,
    )?;

    let snapshot = settle(&mut calls_rx, "the incoming ring", |s| {
        s.session
            .as_ref()
            .is_some_and(|c| c.state == CallState::Ringing)
    })
    .await?;
    let session = snapshot.session.context("Ringing snapshot lost its session")?;
    let caller = match &session.display_name {
        Some(name) => format!("{name} ({})", session.remote_address),
        None => session.remote_address.clone(),
    };
    println!("[calls] Incoming call: {caller}");

    calls.answer().await.context("Failed to answer the call")?;
    let answered = phone
        .await_sent("the answer", |channel, payload| {
            if channel != Channel::Telephony {
                return None;
            }
            match TelephonyMessage::from_bytes(payload).ok()? {
                TelephonyMessage::Answer { id } => Some(id),
                _ => None,
            }
        })
        .await?;
    if answered != call_id {
        bail!("The desktop answered a different call");
    }

    phone.push(
        Channel::Telephony,
        TelephonyMessage::Connected { id: call_id }.to_bytes()?,
    )?;
    settle(&mut calls_rx, "the call to go active", |s| {
        s.session
            .as_ref()
            .is_some_and(|c| c.state == CallState::Active)
    })
    .await?;
    println!("[calls] Answered from the desktop; the call is active.");

    sleep(Duration::from_millis(300)).await;

    phone.push(
        Channel::Telephony,
        TelephonyMessage::Ended {
            id: call_id,
            reason: CallEndReason::Remote,
        }
        .to_bytes()?,
    )?;
    settle(&mut calls_rx, "the hangup", |s| {
        s.session.as_ref().is_some_and(|c| !c.state.is_busy())
    })
    .await?;
    println!("[calls] The phone hung up.");
    println!();
    Ok(())
}

/// Two notifications arrive; the desktop dismisses one of them.
async fn notification_scene(link: &DeviceLink, phone: &mut SimulatedPhone) -> Result<()> {
    let notifications = link.notifications();
    let mut notify_rx = notifications.watch();

    for (key, app, title, text) in [
        ("demo-msg-1", "Messages", "Dana Hart", "See you at 6?"),
        ("demo-mail-1", "Mail", "Build report", "Nightly run passed"),
    ] {
        phone.push(
            Channel::Notifications,
            NotificationMessage::Posted(MirroredNotification {
                id: NotificationKey::new(key),
                app_name: app.into(),
                title: title.into(),
                text: text.into(),
                app_icon: None,
                posted_at: Utc::now(),
            })
            .to_bytes()?,
        )?;
    }

    let snapshot = settle(&mut notify_rx, "both notifications", |s| {
        s.notifications.len() == 2
    })
    .await?;
    println!("[notifications] {} mirrored:", snapshot.notifications.len());
    for n in &snapshot.notifications {
        println!("  [{}] {}: {}", n.app_name, n.title, n.text);
    }

    notifications
        .dismiss(NotificationKey::new("demo-msg-1"))
        .await
        .context("Failed to dismiss the notification")?;
    phone
        .await_sent("the dismissal", |channel, payload| {
            if channel != Channel::Notifications {
                return None;
            }
            match NotificationMessage::from_bytes(payload).ok()? {
                NotificationMessage::Dismiss { id } if id.as_str() == "demo-msg-1" => Some(()),
                _ => None,
            }
        })
        .await?;
    println!("[notifications] Dismissed the Messages one; the phone was told to clear it.");
    println!();
    Ok(())
}

/// Playback state mirrors over; the desktop pauses and trims the volume.
async fn media_scene(link: &DeviceLink, phone: &mut SimulatedPhone) -> Result<()> {
    let media = link.media();
    let mut media_rx = media.watch();

    let playing = MediaState {
        is_playing: true,
        track_title: Some("Holiday".into()),
        track_artist: Some("Green Day".into()),
        track_app_name: Some("Spotify".into()),
        volume: 6,
        max_volume: 15,
        has_phone_permission: true,
        ..MediaState::default()
    };
    phone.push(
        Channel::Media,
        MediaMessage::State(playing.clone()).to_bytes()?,
    )?;
    let state = settle(&mut media_rx, "the playing state", |s| s.is_playing).await?;
    println!(
        "[media] Now playing: {} by {} (volume {}/{})",
        state.track_title.as_deref().unwrap_or("unknown"),
        state.track_artist.as_deref().unwrap_or("unknown"),
        state.volume,
        state.max_volume
    );

    media.play_pause().await.context("Failed to send play/pause")?;
    phone
        .await_sent("the pause command", |channel, payload| {
            if channel != Channel::Media {
                return None;
            }
            matches!(
                MediaMessage::from_bytes(payload).ok()?,
                MediaMessage::PlayPause
            )
            .then_some(())
        })
        .await?;
    phone.push(
        Channel::Media,
        MediaMessage::State(MediaState {
            is_playing: false,
            ..playing
        })
        .to_bytes()?,
    )?;
    settle(&mut media_rx, "the paused state", |s| !s.is_playing).await?;
    println!("[media] Paused from the desktop.");

    media
        .set_volume(40)
        .await
        .context("Failed to send the volume request")?;
    let requested = phone
        .await_sent("the volume request", |channel, payload| {
            if channel != Channel::Media {
                return None;
            }
            match MediaMessage::from_bytes(payload).ok()? {
                MediaMessage::SetVolume { volume } => Some(volume),
                _ => None,
            }
        })
        .await?;
    println!("[media] Asked for volume 40; the request went out clamped to {requested}.");
    println!();
    Ok(())
}

/// A message queued two seconds out goes through the phone on time.
async fn schedule_scene(link: &DeviceLink, phone: &mut SimulatedPhone) -> Result<()> {
    let schedules = link.schedules();
    let mut schedule_rx = schedules.watch();

    let when = Utc::now() + chrono::Duration::seconds(2);
    let id = schedules
        .schedule(
            "+15550182",
            Some("Dana Hart".into()),
            "Running late, save me a seat.",
            when,
        )
        .await
        .context("Failed to schedule the message")?;
    println!("[schedule] Queued a message to Dana Hart, due in 2s.");

    let to = phone
        .await_sent("the scheduled send", |channel, payload| {
            if channel != Channel::Messaging {
                return None;
            }
            match MessagingMessage::from_bytes(payload).ok()? {
                MessagingMessage::Send {
                    request_id, to, ..
                } if request_id == id => Some(to),
                _ => None,
            }
        })
        .await?;
    println!("[schedule] The phone was handed the message for {to}.");

    phone.push(
        Channel::Messaging,
        MessagingMessage::SendResult {
            request_id: id,
            accepted: true,
            error: None,
        }
        .to_bytes()?,
    )?;
    let snapshot = settle(&mut schedule_rx, "the sent receipt", |messages| {
        messages
            .iter()
            .any(|m| m.id == id && m.status == ScheduleStatus::Sent)
    })
    .await?;
    let sent = snapshot
        .iter()
        .find(|m| m.id == id)
        .context("The sent message fell out of the snapshot")?;
    if let Some(at) = sent.sent_at {
        println!(
            "[schedule] The phone accepted it; marked sent at {}.",
            at.format("%H:%M:%S UTC")
        );
    }
    println!();
    Ok(())
}

/// The phone streams a file down; it lands in the download directory.
async fn download_scene(link: &DeviceLink, phone: &mut SimulatedPhone) -> Result<()> {
    let transfers = link.transfers();
    let mut transfer_rx = transfers.watch();

    let id = TransferId::new();
    let photo: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
    phone.push(
        Channel::Transfer,
        TransferMessage::Begin {
            id,
            file_name: "sunset.jpg".into(),
            size: photo.len() as u64,
        }
        .to_bytes()?,
    )?;
    for (seq, chunk) in photo.chunks(1000).enumerate() {
        phone.push(
            Channel::Transfer,
            TransferMessage::Chunk {
                id,
                seq: seq as u64,
                data: chunk.to_vec(),
            }
            .to_bytes()?,
        )?;
    }
    phone.push(Channel::Transfer, TransferMessage::Complete { id }.to_bytes()?)?;

    let snapshot = settle(&mut transfer_rx, "the download", |transfers| {
        transfers
            .iter()
            .any(|t| t.id == id && t.state == TransferState::Received)
    })
    .await?;
    let received = snapshot
        .iter()
        .find(|t| t.id == id)
        .context("The finished download fell out of the snapshot")?;
    println!(
        "[transfer] Received {} ({} bytes) from the phone.",
        received.file_name, received.size_bytes
    );
    Ok(())
}

/// The desktop streams a file up and the phone counts the chunks.
async fn upload_scene(
    link: &DeviceLink,
    phone: &mut SimulatedPhone,
    scratch: &Path,
) -> Result<()> {
    let transfers = link.transfers();
    let mut transfer_rx = transfers.watch();

    let source = scratch.join("notes.txt");
    let text = "phonelink demo upload\n".repeat(150);
    tokio::fs::create_dir_all(scratch)
        .await
        .context("Failed to create the scratch directory")?;
    tokio::fs::write(&source, &text)
        .await
        .context("Failed to write the demo file")?;

    let id = transfers
        .send_file(&source)
        .await
        .context("Failed to start the upload")?;

    let chunks = Cell::new(0usize);
    phone
        .await_sent("the upload to finish", |channel, payload| {
            if channel != Channel::Transfer {
                return None;
            }
            match TransferMessage::from_bytes(payload).ok()? {
                TransferMessage::Chunk { id: chunk_id, .. } if chunk_id == id => {
                    chunks.set(chunks.get() + 1);
                    None
                }
                TransferMessage::Complete { id: done } if done == id => Some(()),
                _ => None,
            }
        })
        .await?;
    settle(&mut transfer_rx, "the sent state", |transfers| {
        transfers
            .iter()
            .any(|t| t.id == id && t.state == TransferState::Sent)
    })
    .await?;
    println!(
        "[transfer] Sent notes.txt ({} bytes) to the phone in {} chunks.",
        text.len(),
        chunks.get()
    );
    println!();
    Ok(())
}

/// The phone walks away; local requests fail instead of hanging.
async fn disconnect_scene(link: &DeviceLink, phone: &SimulatedPhone) -> Result<()> {
    phone.drop_link();

    let mut status_rx = link.status();
    settle(&mut status_rx, "the link to drop", |s| !s.connected).await?;
    println!("[link] The phone dropped the link.");

    match link.calls().place_call("+15550182").await {
        Err(error) => println!("[link] Placing a call now fails: {error}"),
        Ok(_) => bail!("Expected the call to fail with the link down"),
    }
    Ok(())
}

/// The phone half of the conversation, played over the mock transport.
struct SimulatedPhone {
    transport: MockTransport,
    seen: usize,
}

impl SimulatedPhone {
    fn new(transport: MockTransport) -> Self {
        Self { transport, seen: 0 }
    }

    /// Deliver a frame to the desktop as if the phone sent it.
    fn push(&self, channel: Channel, payload: Vec<u8>) -> Result<()> {
        let frame = Envelope::new(channel, payload).to_bytes()?;
        self.transport.push_frame(frame);
        Ok(())
    }

    /// Sever the link from the phone side.
    fn drop_link(&self) {
        self.transport.drop_link();
    }

    /// Wait until the desktop sends a frame that `pick` accepts.
    ///
    /// Scans sent frames in order and never rereads one, so earlier
    /// traffic cannot satisfy a later wait.
    async fn await_sent<T>(
        &mut self,
        waiting_for: &str,
        pick: impl Fn(Channel, &[u8]) -> Option<T>,
    ) -> Result<T> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let frames = self.transport.sent_messages();
            while self.seen < frames.len() {
                let envelope = Envelope::from_bytes(&frames[self.seen])?;
                self.seen += 1;
                let Ok(channel) = envelope.channel() else {
                    continue;
                };
                if let Some(found) = pick(channel, &envelope.payload) {
                    return Ok(found);
                }
            }
            if Instant::now() >= deadline {
                bail!("Timed out waiting for {waiting_for}");
            }
            sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Wait until a watched snapshot satisfies `ready`, returning it.
async fn settle<T: Clone>(
    rx: &mut watch::Receiver<T>,
    waiting_for: &str,
    ready: impl Fn(&T) -> bool,
) -> Result<T> {
    let wait = async {
        loop {
            let current = rx.borrow_and_update().clone();
            if ready(&current) {
                return Ok::<_, anyhow::Error>(current);
            }
            rx.changed()
                .await
                .context("The link stopped publishing updates")?;
        }
    };
    match timeout(Duration::from_secs(10), wait).await {
        Ok(result) => result,
        Err(_) => bail!("Timed out waiting for {waiting_for}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_whole_script_runs() {
        run(LinkConfig::default()).await.unwrap();
    }
}
