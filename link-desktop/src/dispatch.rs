//! Frame dispatch between the transport and the channel services.
//!
//! A single inbound pump owns the transport's receive side. It decodes
//! each envelope, handles status frames inline, and hands every other
//! payload to the service owning that channel. One pump means frames
//! within a channel are delivered in arrival order.
//!
//! The pump is the only writer of the [`LinkStatus`] snapshot.

use std::sync::Arc;
use std::time::Duration;

use link_types::{
    Channel, Envelope, LinkError, LinkStatus, MediaMessage, MessagingMessage, NotificationMessage,
    StatusMessage, TelephonyMessage, TransferMessage, PROTOCOL_VERSION,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::Transport;

/// Sending half of the link, shared by all channel services.
///
/// Fails fast with [`LinkError::LinkDown`] when the transport is not
/// connected, and bounds every send with the configured timeout.
#[derive(Clone)]
pub struct Outbound {
    transport: Arc<dyn Transport>,
    send_timeout: Duration,
}

impl Outbound {
    /// Create an outbound sender over a transport.
    pub fn new(transport: Arc<dyn Transport>, send_timeout: Duration) -> Self {
        Self {
            transport,
            send_timeout,
        }
    }

    /// Whether the underlying transport is connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Wrap a payload in an envelope and send it to the phone.
    pub async fn send(&self, channel: Channel, payload: Vec<u8>) -> Result<(), LinkError> {
        if !self.transport.is_connected() {
            return Err(LinkError::LinkDown);
        }

        let bytes = Envelope::new(channel, payload).to_bytes()?;
        match tokio::time::timeout(self.send_timeout, self.transport.send(&bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(?channel, error = %e, "transport send failed");
                Err(LinkError::LinkDown)
            }
            Err(_) => Err(LinkError::Timeout(self.send_timeout)),
        }
    }
}

/// Per-channel senders the dispatcher routes decoded frames into.
pub struct ChannelRouter {
    /// Telephony frames, consumed by the call service.
    pub telephony: mpsc::Sender<TelephonyMessage>,
    /// Messaging frames, consumed by the schedule service.
    pub messaging: mpsc::Sender<MessagingMessage>,
    /// Transfer frames, consumed by the transfer service.
    pub transfer: mpsc::Sender<TransferMessage>,
    /// Notification frames, consumed by the notification service.
    pub notifications: mpsc::Sender<NotificationMessage>,
    /// Media frames, consumed by the media service.
    pub media: mpsc::Sender<MediaMessage>,
}

/// The inbound pump.
///
/// Runs until the transport reports the link closed, then publishes a
/// disconnected status and exits. Dropping the router closes every
/// service's inbound channel, which is how services learn the link died.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    status_tx: watch::Sender<LinkStatus>,
    router: ChannelRouter,
}

impl Dispatcher {
    /// Create a dispatcher over a transport.
    pub fn new(
        transport: Arc<dyn Transport>,
        status_tx: watch::Sender<LinkStatus>,
        router: ChannelRouter,
    ) -> Self {
        Self {
            transport,
            status_tx,
            router,
        }
    }

    /// Spawn the pump task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        loop {
            match self.transport.recv().await {
                Ok(frame) => self.dispatch_frame(&frame).await,
                Err(e) => {
                    info!(error = %e, "link receive ended");
                    break;
                }
            }
        }

        self.status_tx.send_modify(|status| {
            status.connected = false;
            status.phone = None;
        });
    }

    /// Decode one frame and route it. A bad frame is dropped with a
    /// warning; it never ends the pump.
    async fn dispatch_frame(&self, frame: &[u8]) {
        let envelope = match Envelope::from_bytes(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, len = frame.len(), "dropping undecodable frame");
                return;
            }
        };

        if envelope.version != PROTOCOL_VERSION {
            warn!(
                version = envelope.version,
                "dropping frame with unsupported protocol version"
            );
            return;
        }

        let channel = match envelope.channel() {
            Ok(channel) => channel,
            Err(e) => {
                warn!(error = %e, "dropping frame for unrecognized channel");
                return;
            }
        };

        match channel {
            Channel::Status => self.handle_status(&envelope.payload),
            Channel::Telephony => {
                route(
                    &self.router.telephony,
                    TelephonyMessage::from_bytes(&envelope.payload),
                    channel,
                )
                .await
            }
            Channel::Messaging => {
                route(
                    &self.router.messaging,
                    MessagingMessage::from_bytes(&envelope.payload),
                    channel,
                )
                .await
            }
            Channel::Transfer => {
                route(
                    &self.router.transfer,
                    TransferMessage::from_bytes(&envelope.payload),
                    channel,
                )
                .await
            }
            Channel::Notifications => {
                route(
                    &self.router.notifications,
                    NotificationMessage::from_bytes(&envelope.payload),
                    channel,
                )
                .await
            }
            Channel::Media => {
                route(
                    &self.router.media,
                    MediaMessage::from_bytes(&envelope.payload),
                    channel,
                )
                .await
            }
        }
    }

    /// Status frames update the link snapshot and go no further.
    fn handle_status(&self, payload: &[u8]) {
        match StatusMessage::from_bytes(payload) {
            Ok(StatusMessage::Update(phone)) => {
                debug!(battery = phone.battery_level, "phone status update");
                self.status_tx.send_modify(|status| {
                    status.connected = true;
                    status.phone = Some(phone);
                });
            }
            Ok(StatusMessage::Heartbeat) => {}
            Err(e) => warn!(error = %e, "dropping undecodable status frame"),
        }
    }
}

async fn route<T>(tx: &mpsc::Sender<T>, decoded: Result<T, LinkError>, channel: Channel) {
    match decoded {
        Ok(message) => {
            if tx.send(message).await.is_err() {
                debug!(?channel, "channel service gone, dropping frame");
            }
        }
        Err(e) => warn!(?channel, error = %e, "dropping undecodable frame"),
    }
}
