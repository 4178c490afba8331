//! Notification mirror service.
//!
//! Keeps the ordered, capped log of notifications mirrored from the
//! phone, persists it through the store so history survives restarts,
//! and propagates local dismissals back to the phone. The in-memory log
//! is authoritative for the UI; a store or send failure never undoes a
//! local change.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use link_core::{Ingest, NotificationLog};
use link_types::{Channel, LinkError, MirroredNotification, NotificationKey, NotificationMessage};

use crate::dispatch::Outbound;
use crate::storage::LinkStore;

/// Observable state of the notification mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSnapshot {
    /// Whether inbound notifications are currently ingested.
    pub enabled: bool,
    /// Mirrored notifications, oldest first.
    pub notifications: Vec<MirroredNotification>,
}

impl Default for NotificationSnapshot {
    fn default() -> Self {
        Self {
            enabled: true,
            notifications: Vec::new(),
        }
    }
}

enum NotificationCommand {
    SetEnabled {
        enabled: bool,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Dismiss {
        id: NotificationKey,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
}

/// Handle to the notification mirror service. Cloneable; all clones talk
/// to the same service task.
#[derive(Clone)]
pub struct NotificationHandle {
    commands: mpsc::Sender<NotificationCommand>,
    snapshot_rx: watch::Receiver<NotificationSnapshot>,
}

impl NotificationHandle {
    /// Turn mirroring on or off. Turning it off clears the log and the
    /// persisted history.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(NotificationCommand::SetEnabled {
                enabled,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }

    /// Remove a notification locally and ask the phone to clear its
    /// copy. Dismissing a key that is not present is a no-op.
    pub async fn dismiss(&self, id: NotificationKey) -> Result<(), LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(NotificationCommand::Dismiss {
                id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }

    /// Current mirror state.
    pub fn snapshot(&self) -> NotificationSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that observes every snapshot change.
    pub fn watch(&self) -> watch::Receiver<NotificationSnapshot> {
        self.snapshot_rx.clone()
    }
}

pub(crate) struct NotificationService {
    store: Arc<dyn LinkStore>,
    outbound: Outbound,
    log: NotificationLog,
    enabled: bool,
    snapshot_tx: watch::Sender<NotificationSnapshot>,
}

impl NotificationService {
    pub(crate) fn spawn(
        outbound: Outbound,
        inbound: mpsc::Receiver<NotificationMessage>,
        store: Arc<dyn LinkStore>,
        retention: usize,
    ) -> (NotificationHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(NotificationSnapshot::default());
        let service = NotificationService {
            store,
            outbound,
            log: NotificationLog::new(retention),
            enabled: true,
            snapshot_tx,
        };
        let task = tokio::spawn(service.run(command_rx, inbound));
        let handle = NotificationHandle {
            commands: command_tx,
            snapshot_rx,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<NotificationCommand>,
        mut inbound: mpsc::Receiver<NotificationMessage>,
    ) {
        self.load().await;
        let mut link_open = true;
        loop {
            tokio::select! {
                maybe_command = commands.recv() => match maybe_command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                maybe_message = inbound.recv(), if link_open => match maybe_message {
                    Some(message) => self.on_remote(message).await,
                    None => link_open = false,
                },
            }
        }
    }

    /// Rebuild the log from persisted history. The stored list can be
    /// longer than the cap when the configured retention shrank; the
    /// overflow is evicted and deleted here.
    async fn load(&mut self) {
        let stored = match self.store.load_notifications().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "could not load notification history");
                return;
            }
        };
        for notification in stored {
            if let Ingest::Evicted(evicted) = self.log.ingest(notification) {
                if let Err(e) = self.store.delete_notification(&evicted.id).await {
                    warn!(id = %evicted.id, error = %e, "could not delete evicted notification");
                }
            }
        }
        self.publish();
    }

    async fn on_command(&mut self, command: NotificationCommand) {
        match command {
            NotificationCommand::SetEnabled { enabled, reply } => {
                let result = self.set_enabled(enabled).await;
                let _ = reply.send(result);
            }
            NotificationCommand::Dismiss { id, reply } => {
                let result = self.dismiss(id).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn set_enabled(&mut self, enabled: bool) -> Result<(), LinkError> {
        if enabled == self.enabled {
            return Ok(());
        }
        if !enabled {
            self.store.clear_notifications().await?;
            self.log.clear();
        }
        self.enabled = enabled;
        self.publish();
        Ok(())
    }

    async fn dismiss(&mut self, id: NotificationKey) -> Result<(), LinkError> {
        if !self.log.dismiss(&id) {
            return Ok(());
        }
        if let Err(e) = self.store.delete_notification(&id).await {
            warn!(id = %id, error = %e, "could not delete dismissed notification");
        }
        self.publish();
        // Best effort; the local removal stands even if the phone never
        // hears about it.
        let clear = NotificationMessage::Dismiss { id };
        if let Ok(payload) = clear.to_bytes() {
            let _ = self.outbound.send(Channel::Notifications, payload).await;
        }
        Ok(())
    }

    async fn on_remote(&mut self, message: NotificationMessage) {
        match message {
            NotificationMessage::Posted(notification) => {
                if !self.enabled {
                    debug!(id = %notification.id, "mirroring disabled, notification dropped");
                    return;
                }
                let outcome = self.log.ingest(notification.clone());
                if let Err(e) = self.store.upsert_notification(&notification).await {
                    warn!(id = %notification.id, error = %e, "could not persist notification");
                }
                if let Ingest::Evicted(evicted) = outcome {
                    if let Err(e) = self.store.delete_notification(&evicted.id).await {
                        warn!(id = %evicted.id, error = %e, "could not delete evicted notification");
                    }
                }
                self.publish();
            }
            NotificationMessage::Dismissed { id } => {
                // The phone cleared it on its side; no echo back.
                if self.log.dismiss(&id) {
                    if let Err(e) = self.store.delete_notification(&id).await {
                        warn!(id = %id, error = %e, "could not delete dismissed notification");
                    }
                    self.publish();
                }
            }
            NotificationMessage::Dismiss { id } => {
                debug!(id = %id, "ignoring desktop-bound dismiss request from phone");
            }
        }
    }

    fn publish(&self) {
        let snapshot = NotificationSnapshot {
            enabled: self.enabled,
            notifications: self.log.snapshot(),
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
