//! Media control service.
//!
//! A thin reflector: control methods send one-shot commands to the
//! phone, and the local [`MediaState`] changes only when the phone
//! pushes a new snapshot back. Playback truth lives on the phone, so
//! nothing here is updated optimistically.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use link_types::{Channel, LinkError, MediaMessage, MediaState};

use crate::dispatch::Outbound;

enum MediaCommand {
    PlayPause {
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Next {
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Previous {
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    SetVolume {
        volume: u32,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
}

/// Handle to the media control service. Cloneable; all clones talk to
/// the same service task.
#[derive(Clone)]
pub struct MediaHandle {
    commands: mpsc::Sender<MediaCommand>,
    snapshot_rx: watch::Receiver<MediaState>,
}

impl MediaHandle {
    /// Toggle play/pause on the phone.
    pub async fn play_pause(&self) -> Result<(), LinkError> {
        self.request(|reply| MediaCommand::PlayPause { reply }).await
    }

    /// Skip to the next track.
    pub async fn next(&self) -> Result<(), LinkError> {
        self.request(|reply| MediaCommand::Next { reply }).await
    }

    /// Return to the previous track.
    pub async fn previous(&self) -> Result<(), LinkError> {
        self.request(|reply| MediaCommand::Previous { reply }).await
    }

    /// Set the phone's media volume.
    ///
    /// The requested value is clamped to the last known maximum before
    /// it is sent.
    pub async fn set_volume(&self, volume: u32) -> Result<(), LinkError> {
        self.request(|reply| MediaCommand::SetVolume { volume, reply })
            .await
    }

    /// Last playback state pushed by the phone.
    pub fn snapshot(&self) -> MediaState {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that observes every snapshot change.
    pub fn watch(&self) -> watch::Receiver<MediaState> {
        self.snapshot_rx.clone()
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<(), LinkError>>) -> MediaCommand,
    ) -> Result<(), LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }
}

pub(crate) struct MediaService {
    outbound: Outbound,
    state: MediaState,
    snapshot_tx: watch::Sender<MediaState>,
}

impl MediaService {
    pub(crate) fn spawn(
        outbound: Outbound,
        inbound: mpsc::Receiver<MediaMessage>,
    ) -> (MediaHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(MediaState::default());
        let service = MediaService {
            outbound,
            state: MediaState::default(),
            snapshot_tx,
        };
        let task = tokio::spawn(service.run(command_rx, inbound));
        let handle = MediaHandle {
            commands: command_tx,
            snapshot_rx,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<MediaCommand>,
        mut inbound: mpsc::Receiver<MediaMessage>,
    ) {
        let mut link_open = true;
        loop {
            tokio::select! {
                maybe_command = commands.recv() => match maybe_command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                maybe_message = inbound.recv(), if link_open => match maybe_message {
                    Some(message) => self.on_remote(message),
                    None => link_open = false,
                },
            }
        }
    }

    async fn on_command(&mut self, command: MediaCommand) {
        let (message, reply) = match command {
            MediaCommand::PlayPause { reply } => (MediaMessage::PlayPause, reply),
            MediaCommand::Next { reply } => (MediaMessage::Next, reply),
            MediaCommand::Previous { reply } => (MediaMessage::Previous, reply),
            MediaCommand::SetVolume { volume, reply } => {
                let volume = self.state.clamp_volume(volume);
                (MediaMessage::SetVolume { volume }, reply)
            }
        };
        let result = self.send(message).await;
        let _ = reply.send(result);
    }

    async fn send(&self, message: MediaMessage) -> Result<(), LinkError> {
        let payload = message.to_bytes()?;
        self.outbound.send(Channel::Media, payload).await
    }

    fn on_remote(&mut self, message: MediaMessage) {
        match message {
            MediaMessage::State(state) => {
                self.state = state;
                self.publish();
            }
            other => {
                debug!(?other, "ignoring desktop-bound media command from phone");
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.state.clone();
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
