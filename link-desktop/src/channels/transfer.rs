//! File transfer service.
//!
//! Uploads stream a local file to the phone as `Begin` / `Chunk` /
//! `Complete`; downloads are driven by the same frames arriving from the
//! phone, buffered in memory and written under the download directory
//! once whole. The service task owns the registry; upload tasks report
//! progress back through an internal event channel so no two writers
//! ever touch one transfer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use link_core::{Transfer, TransferState};
use link_types::{Channel, LinkError, TransferId, TransferMessage};

use crate::dispatch::Outbound;

enum TransferCommand {
    SendFile {
        path: PathBuf,
        reply: oneshot::Sender<Result<TransferId, LinkError>>,
    },
    Retry {
        id: TransferId,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Cancel {
        id: TransferId,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
}

enum TransferEvent {
    Progress { id: TransferId, transferred: u64 },
    Completed { id: TransferId },
    Failed { id: TransferId, error: String },
}

/// Handle to the transfer service. Cloneable; all clones talk to the
/// same service task.
#[derive(Clone)]
pub struct TransferHandle {
    commands: mpsc::Sender<TransferCommand>,
    snapshot_rx: watch::Receiver<Vec<Transfer>>,
}

impl TransferHandle {
    /// Start uploading a local file to the phone.
    pub async fn send_file(&self, path: impl Into<PathBuf>) -> Result<TransferId, LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(TransferCommand::SendFile {
                path: path.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }

    /// Restart a failed upload from the beginning.
    pub async fn retry(&self, id: TransferId) -> Result<(), LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(TransferCommand::Retry {
                id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }

    /// Abort an in-flight transfer. It lands in `Failed` with a
    /// cancellation error.
    pub async fn cancel(&self, id: TransferId) -> Result<(), LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(TransferCommand::Cancel {
                id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::LinkDown)?;
        reply_rx.await.map_err(|_| LinkError::LinkDown)?
    }

    /// Current transfers, in creation order.
    pub fn snapshot(&self) -> Vec<Transfer> {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that observes every snapshot change.
    pub fn watch(&self) -> watch::Receiver<Vec<Transfer>> {
        self.snapshot_rx.clone()
    }
}

struct DownloadBuffer {
    data: Vec<u8>,
    next_seq: u64,
}

pub(crate) struct TransferService {
    outbound: Outbound,
    chunk_bytes: usize,
    download_dir: PathBuf,
    registry: Arc<DashMap<TransferId, Transfer>>,
    /// Creation order of registry entries; the registry itself iterates
    /// in hash order.
    order: Vec<TransferId>,
    buffers: HashMap<TransferId, DownloadBuffer>,
    tasks: HashMap<TransferId, JoinHandle<()>>,
    paths: HashMap<TransferId, PathBuf>,
    events_tx: mpsc::Sender<TransferEvent>,
    snapshot_tx: watch::Sender<Vec<Transfer>>,
}

impl TransferService {
    pub(crate) fn spawn(
        outbound: Outbound,
        inbound: mpsc::Receiver<TransferMessage>,
        chunk_bytes: usize,
        download_dir: PathBuf,
    ) -> (TransferHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::channel(64);
        let (snapshot_tx, snapshot_rx) = watch::channel(Vec::new());
        let service = TransferService {
            outbound,
            chunk_bytes: chunk_bytes.max(1),
            download_dir,
            registry: Arc::new(DashMap::new()),
            order: Vec::new(),
            buffers: HashMap::new(),
            tasks: HashMap::new(),
            paths: HashMap::new(),
            events_tx,
            snapshot_tx,
        };
        let task = tokio::spawn(service.run(command_rx, inbound, events_rx));
        let handle = TransferHandle {
            commands: command_tx,
            snapshot_rx,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<TransferCommand>,
        mut inbound: mpsc::Receiver<TransferMessage>,
        mut events: mpsc::Receiver<TransferEvent>,
    ) {
        let mut link_open = true;
        loop {
            tokio::select! {
                maybe_command = commands.recv() => match maybe_command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                maybe_message = inbound.recv(), if link_open => match maybe_message {
                    Some(message) => self.on_remote(message).await,
                    None => {
                        link_open = false;
                        self.on_link_closed();
                    }
                },
                maybe_event = events.recv() => {
                    if let Some(event) = maybe_event {
                        self.on_event(event);
                    }
                }
            }
        }
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }

    async fn on_command(&mut self, command: TransferCommand) {
        match command {
            TransferCommand::SendFile { path, reply } => {
                let result = self.send_file(path).await;
                let _ = reply.send(result);
            }
            TransferCommand::Retry { id, reply } => {
                let result = self.retry(id);
                let _ = reply.send(result);
            }
            TransferCommand::Cancel { id, reply } => {
                let result = self.cancel(id).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn send_file(&mut self, path: PathBuf) -> Result<TransferId, LinkError> {
        if !self.outbound.is_connected() {
            return Err(LinkError::LinkDown);
        }
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(LinkError::InvalidState(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return Err(LinkError::InvalidState("path has no file name".into())),
        };
        let size = metadata.len();

        let id = TransferId::new();
        let transfer = Transfer::upload(id, file_name.clone(), size, Utc::now());
        self.order.push(id);
        self.registry.insert(id, transfer);
        self.paths.insert(id, path.clone());
        self.publish();
        self.spawn_upload(id, path, file_name, size);
        Ok(id)
    }

    fn retry(&mut self, id: TransferId) -> Result<(), LinkError> {
        if !self.outbound.is_connected() {
            return Err(LinkError::LinkDown);
        }
        // Downloads have no local source; the phone re-initiates those.
        let Some(path) = self.paths.get(&id).cloned() else {
            return Err(LinkError::InvalidState(
                "only failed uploads can be retried".into(),
            ));
        };
        let (file_name, size) = {
            let mut entry = self
                .registry
                .get_mut(&id)
                .ok_or_else(|| LinkError::InvalidState("unknown transfer".into()))?;
            entry.retry(Utc::now())?;
            (entry.file_name.clone(), entry.size_bytes)
        };
        self.publish();
        self.spawn_upload(id, path, file_name, size);
        Ok(())
    }

    async fn cancel(&mut self, id: TransferId) -> Result<(), LinkError> {
        let in_flight = match self.registry.get(&id) {
            Some(t) => t.state.is_in_flight(),
            None => return Err(LinkError::InvalidState("unknown transfer".into())),
        };
        if !in_flight {
            return Err(LinkError::InvalidState("transfer is not in flight".into()));
        }
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
        self.buffers.remove(&id);
        let changed = match self.registry.get_mut(&id) {
            Some(mut t) => t.fail("cancelled", Utc::now()),
            None => false,
        };
        if changed {
            self.publish();
            self.send_abort(id, "cancelled".into()).await;
        }
        Ok(())
    }

    fn spawn_upload(&mut self, id: TransferId, path: PathBuf, file_name: String, size: u64) {
        let task = tokio::spawn(run_upload(
            id,
            path,
            file_name,
            size,
            self.chunk_bytes,
            self.outbound.clone(),
            self.events_tx.clone(),
        ));
        self.tasks.insert(id, task);
    }

    fn on_event(&mut self, event: TransferEvent) {
        let now = Utc::now();
        match event {
            TransferEvent::Progress { id, transferred } => {
                let changed = match self.registry.get_mut(&id) {
                    Some(mut t) => t.record_progress(transferred, now),
                    None => false,
                };
                if changed {
                    self.publish();
                }
            }
            TransferEvent::Completed { id } => {
                self.tasks.remove(&id);
                let changed = match self.registry.get_mut(&id) {
                    Some(mut t) => t.complete(now),
                    None => false,
                };
                if changed {
                    self.publish();
                }
            }
            TransferEvent::Failed { id, error } => {
                self.tasks.remove(&id);
                warn!(%id, error = %error, "upload failed");
                let changed = match self.registry.get_mut(&id) {
                    Some(mut t) => t.fail(error, now),
                    None => false,
                };
                if changed {
                    self.publish();
                }
            }
        }
    }

    async fn on_remote(&mut self, message: TransferMessage) {
        match message {
            TransferMessage::Begin {
                id,
                file_name,
                size,
            } => {
                if self.registry.contains_key(&id) {
                    warn!(%id, "duplicate transfer begin");
                    return;
                }
                let name = sanitize_file_name(&file_name);
                let transfer = Transfer::download(id, name, size, Utc::now());
                self.order.push(id);
                self.registry.insert(id, transfer);
                self.buffers.insert(
                    id,
                    DownloadBuffer {
                        data: Vec::new(),
                        next_seq: 0,
                    },
                );
                self.publish();
            }
            TransferMessage::Chunk { id, seq, data } => {
                self.on_chunk(id, seq, data).await;
            }
            TransferMessage::Complete { id } => {
                self.on_remote_complete(id).await;
            }
            TransferMessage::Failed { id, error } => {
                if let Some(task) = self.tasks.remove(&id) {
                    task.abort();
                }
                self.buffers.remove(&id);
                let changed = match self.registry.get_mut(&id) {
                    Some(mut t) => t.fail(error, Utc::now()),
                    None => false,
                };
                if changed {
                    self.publish();
                }
            }
        }
    }

    async fn on_chunk(&mut self, id: TransferId, seq: u64, data: Vec<u8>) {
        enum Verdict {
            Appended(u64),
            Duplicate,
            Gap(u64),
        }
        let verdict = match self.buffers.get_mut(&id) {
            None => {
                debug!(%id, "chunk for a download that is not receiving");
                return;
            }
            Some(buffer) => {
                if seq < buffer.next_seq {
                    Verdict::Duplicate
                } else if seq > buffer.next_seq {
                    Verdict::Gap(buffer.next_seq)
                } else {
                    buffer.next_seq += 1;
                    buffer.data.extend_from_slice(&data);
                    Verdict::Appended(buffer.data.len() as u64)
                }
            }
        };
        match verdict {
            Verdict::Appended(transferred) => {
                let changed = match self.registry.get_mut(&id) {
                    Some(mut t) => t.record_progress(transferred, Utc::now()),
                    None => false,
                };
                if changed {
                    self.publish();
                }
            }
            Verdict::Duplicate => {}
            Verdict::Gap(expected) => {
                self.fail_download(id, format!("missing chunk {expected}, got {seq}"))
                    .await;
            }
        }
    }

    async fn on_remote_complete(&mut self, id: TransferId) {
        let Some(buffer) = self.buffers.remove(&id) else {
            debug!(%id, "completion for a download that is not receiving");
            return;
        };
        let (file_name, size) = match self.registry.get(&id) {
            Some(t) => (t.file_name.clone(), t.size_bytes),
            None => return,
        };
        if buffer.data.len() as u64 != size {
            let received = buffer.data.len();
            self.fail_download(id, format!("incomplete file: {received} of {size} bytes"))
                .await;
            return;
        }
        let result = self.write_download(&file_name, &buffer.data).await;
        let now = Utc::now();
        let changed = match self.registry.get_mut(&id) {
            Some(mut t) => match &result {
                Ok(()) => t.complete(now),
                Err(e) => t.fail(e.to_string(), now),
            },
            None => false,
        };
        if changed {
            self.publish();
        }
    }

    async fn write_download(&self, file_name: &str, data: &[u8]) -> Result<(), std::io::Error> {
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(file_name);
        tokio::fs::write(&path, data).await
    }

    async fn fail_download(&mut self, id: TransferId, error: String) {
        self.buffers.remove(&id);
        let changed = match self.registry.get_mut(&id) {
            Some(mut t) => t.fail(error.clone(), Utc::now()),
            None => false,
        };
        if changed {
            warn!(%id, error = %error, "download failed");
            self.publish();
            self.send_abort(id, error).await;
        }
    }

    /// Best effort; the link may already be gone.
    async fn send_abort(&self, id: TransferId, error: String) {
        let abort = TransferMessage::Failed { id, error };
        if let Ok(payload) = abort.to_bytes() {
            let _ = self.outbound.send(Channel::Transfer, payload).await;
        }
    }

    fn on_link_closed(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
        self.buffers.clear();
        let now = Utc::now();
        let mut changed = false;
        for id in &self.order {
            if let Some(mut t) = self.registry.get_mut(id) {
                if t.fail("link lost", now) {
                    changed = true;
                }
            }
        }
        if changed {
            self.publish();
        }
    }

    fn publish(&self) {
        let snapshot: Vec<Transfer> = self
            .order
            .iter()
            .filter_map(|id| self.registry.get(id).map(|t| t.value().clone()))
            .collect();
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

async fn run_upload(
    id: TransferId,
    path: PathBuf,
    file_name: String,
    size: u64,
    chunk_bytes: usize,
    outbound: Outbound,
    events: mpsc::Sender<TransferEvent>,
) {
    let result = stream_upload(id, &path, &file_name, size, chunk_bytes, &outbound, &events).await;
    let event = match result {
        Ok(()) => TransferEvent::Completed { id },
        Err(error) => {
            let text = error.to_string();
            // Tell the phone the stream is dead; it may already know.
            let abort = TransferMessage::Failed {
                id,
                error: text.clone(),
            };
            if let Ok(payload) = abort.to_bytes() {
                let _ = outbound.send(Channel::Transfer, payload).await;
            }
            TransferEvent::Failed { id, error: text }
        }
    };
    let _ = events.send(event).await;
}

async fn stream_upload(
    id: TransferId,
    path: &Path,
    file_name: &str,
    size: u64,
    chunk_bytes: usize,
    outbound: &Outbound,
    events: &mpsc::Sender<TransferEvent>,
) -> Result<(), LinkError> {
    let mut file = tokio::fs::File::open(path).await?;
    let begin = TransferMessage::Begin {
        id,
        file_name: file_name.to_string(),
        size,
    };
    outbound.send(Channel::Transfer, begin.to_bytes()?).await?;

    let mut buf = vec![0u8; chunk_bytes];
    let mut seq = 0u64;
    let mut transferred = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = TransferMessage::Chunk {
            id,
            seq,
            data: buf[..n].to_vec(),
        };
        outbound.send(Channel::Transfer, chunk.to_bytes()?).await?;
        transferred += n as u64;
        seq += 1;
        let _ = events
            .send(TransferEvent::Progress { id, transferred })
            .await;
    }
    if transferred != size {
        return Err(LinkError::InvalidState(format!(
            "file size changed during upload: expected {size} bytes, read {transferred}"
        )));
    }
    let complete = TransferMessage::Complete { id };
    outbound.send(Channel::Transfer, complete.to_bytes()?).await?;
    Ok(())
}

fn sanitize_file_name(name: &str) -> String {
    let candidate = name.rsplit(['/', '\\']).next().unwrap_or("");
    let trimmed = candidate.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "download.bin".to_string()
    } else {
        trimmed.to_string()
    }
}
