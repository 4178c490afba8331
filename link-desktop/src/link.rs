//! Device link assembly.
//!
//! [`DeviceLink::start`] wires the dispatcher and the five channel
//! services over one transport and hands back the service handles.
//! Everything is constructed here and passed down explicitly; there is
//! no global registry to look services up in.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use link_types::LinkStatus;

use crate::channels::call::CallService;
use crate::channels::media::MediaService;
use crate::channels::notify::NotificationService;
use crate::channels::schedule::ScheduleService;
use crate::channels::transfer::TransferService;
use crate::channels::{
    CallHandle, MediaHandle, NotificationHandle, ScheduleHandle, TransferHandle,
};
use crate::config::LinkConfig;
use crate::dispatch::{ChannelRouter, Dispatcher, Outbound};
use crate::storage::LinkStore;
use crate::transport::Transport;

/// A running device link: the dispatcher plus one service per channel.
///
/// The transport is taken as already paired; `start` never dials it.
/// Dropping `DeviceLink` leaves the tasks running, so keep it for the
/// lifetime of the link and call [`shutdown`](DeviceLink::shutdown) to
/// tear it down.
pub struct DeviceLink {
    transport: Arc<dyn Transport>,
    status_rx: watch::Receiver<LinkStatus>,
    calls: CallHandle,
    transfers: TransferHandle,
    schedules: ScheduleHandle,
    notifications: NotificationHandle,
    media: MediaHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl DeviceLink {
    /// Wire up and spawn the dispatcher and channel services.
    pub fn start(
        config: LinkConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn LinkStore>,
    ) -> Self {
        let outbound = Outbound::new(transport.clone(), config.send_timeout());
        let (status_tx, status_rx) = watch::channel(LinkStatus::disconnected());

        let (telephony_tx, telephony_rx) = mpsc::channel(64);
        let (messaging_tx, messaging_rx) = mpsc::channel(64);
        let (transfer_tx, transfer_rx) = mpsc::channel(64);
        let (notifications_tx, notifications_rx) = mpsc::channel(64);
        let (media_tx, media_rx) = mpsc::channel(64);

        let pump = Dispatcher::new(
            transport.clone(),
            status_tx,
            ChannelRouter {
                telephony: telephony_tx,
                messaging: messaging_tx,
                transfer: transfer_tx,
                notifications: notifications_tx,
                media: media_tx,
            },
        )
        .spawn();

        let (calls, call_task) = CallService::spawn(
            outbound.clone(),
            telephony_rx,
            config.dial_timeout(),
            config.missed_call_retention,
        );
        let (schedules, schedule_task) = ScheduleService::spawn(
            outbound.clone(),
            messaging_rx,
            store.clone(),
            config.send_timeout(),
        );
        let (transfers, transfer_task) = TransferService::spawn(
            outbound.clone(),
            transfer_rx,
            config.transfer_chunk_bytes,
            config.download_dir.clone(),
        );
        let (notifications, notification_task) = NotificationService::spawn(
            outbound.clone(),
            notifications_rx,
            store,
            config.notification_retention,
        );
        let (media, media_task) = MediaService::spawn(outbound, media_rx);

        Self {
            transport,
            status_rx,
            calls,
            transfers,
            schedules,
            notifications,
            media,
            tasks: vec![
                pump,
                call_task,
                schedule_task,
                transfer_task,
                notification_task,
                media_task,
            ],
        }
    }

    /// Link status, updated by the dispatcher on status frames and
    /// disconnects.
    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status_rx.clone()
    }

    /// Handle to the call session manager.
    pub fn calls(&self) -> CallHandle {
        self.calls.clone()
    }

    /// Handle to the file transfer pipeline.
    pub fn transfers(&self) -> TransferHandle {
        self.transfers.clone()
    }

    /// Handle to the scheduled message service.
    pub fn schedules(&self) -> ScheduleHandle {
        self.schedules.clone()
    }

    /// Handle to the notification mirror.
    pub fn notifications(&self) -> NotificationHandle {
        self.notifications.clone()
    }

    /// Handle to the media controls.
    pub fn media(&self) -> MediaHandle {
        self.media.clone()
    }

    /// Close the transport and stop every task.
    ///
    /// In-flight uploads stop at their next send once the transport is
    /// closed. Handles kept by callers keep answering snapshot reads but
    /// every operation on them fails with `LinkDown`.
    pub async fn shutdown(self) {
        let _ = self.transport.close().await;
        for task in self.tasks {
            task.abort();
        }
    }
}
