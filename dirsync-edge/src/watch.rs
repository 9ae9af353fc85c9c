//! Filesystem watcher and the outbound producer.
//!
//! A notify watcher on the synced directory feeds events across a channel
//! into tokio. Create and write events for a path are debounced: each event
//! arms (or re-arms) a 100 ms timer keyed by the path, and only the terminal
//! fire reads the file and emits a `CLIENT_PUSH_CONTENT`. This coalesces
//! editor save bursts into one message carrying the settled bytes. Removes
//! are never debounced.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dirsync_types::{ChangeRecord, Message, MessageKind};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{EdgeError, SecretKey};

/// Quiescence window before a create/write burst turns into one push.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Watch `directory` and feed outbound messages into `outbound`.
///
/// The returned handle owns the notify watcher; dropping it stops the event
/// flow. The producer task itself ends when the event channel drains after
/// that.
pub(crate) fn spawn(
    directory: PathBuf,
    key: SecretKey,
    outbound: mpsc::Sender<Message>,
) -> Result<WatchHandle, EdgeError> {
    let (event_tx, mut event_rx) = mpsc::channel::<notify::Result<notify::Event>>(256);

    // The notify callback runs on the watcher's own thread; blocking_send
    // bridges it into the async side.
    let mut watcher = notify::recommended_watcher(move |event| {
        let _ = event_tx.blocking_send(event);
    })?;
    watcher.watch(&directory, RecursiveMode::NonRecursive)?;
    tracing::info!("watching {}", directory.display());

    let producer = Producer::new(directory, key, outbound);
    let task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                Ok(event) => producer.handle_event(event).await,
                Err(err) => tracing::warn!("watcher error: {err}"),
            }
        }
    });

    Ok(WatchHandle {
        _watcher: watcher,
        _task: task,
    })
}

/// Keeps the watcher and its producer task alive.
pub(crate) struct WatchHandle {
    _watcher: RecommendedWatcher,
    _task: JoinHandle<()>,
}

/// Turns filesystem events into outbound protocol messages.
pub(crate) struct Producer {
    directory: PathBuf,
    key: SecretKey,
    outbound: mpsc::Sender<Message>,
    timers: Arc<DashMap<PathBuf, JoinHandle<()>>>,
}

impl Producer {
    pub(crate) fn new(directory: PathBuf, key: SecretKey, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            directory,
            key,
            outbound,
            timers: Arc::new(DashMap::new()),
        }
    }

    /// Route one notify event.
    ///
    /// Creates and writes are identical. A rename shows up as a rename-from
    /// (the old path disappears) and a rename-to (the new path appears), so
    /// those map to remove and push respectively.
    pub(crate) async fn handle_event(&self, event: notify::Event) {
        for path in event.paths {
            match event.kind {
                EventKind::Create(_)
                | EventKind::Modify(ModifyKind::Data(_))
                | EventKind::Modify(ModifyKind::Any)
                | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                    self.schedule_push(path);
                }
                EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                    self.send_remove(&path).await;
                }
                EventKind::Modify(ModifyKind::Name(_)) => {
                    // Platform-dependent rename shapes: decide by what is on disk.
                    if path.exists() {
                        self.schedule_push(path);
                    } else {
                        self.send_remove(&path).await;
                    }
                }
                _ => {}
            }
        }
    }

    /// Arm (or re-arm) the debounce timer for a path.
    pub(crate) fn schedule_push(&self, path: PathBuf) {
        let timers = self.timers.clone();
        let directory = self.directory.clone();
        let key = self.key.clone();
        let outbound = self.outbound.clone();
        let timer_path = path.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE_WINDOW).await;
            timers.remove(&timer_path);
            if let Err(err) = push_file(&directory, &key, &outbound, &timer_path).await {
                tracing::warn!("push of {} failed: {err}", timer_path.display());
            }
        });

        if let Some(previous) = self.timers.insert(path, handle) {
            previous.abort();
        }
    }

    /// Emit a removal immediately.
    pub(crate) async fn send_remove(&self, path: &Path) {
        let result = async {
            let rel = relative_to(&self.directory, path)?;
            let record = ChangeRecord::now(rel, Vec::new());
            let payload = self.key.seal(record.encode().as_bytes())?;
            Ok::<_, EdgeError>(Message::new(MessageKind::ClientRemoveFile, payload))
        }
        .await;

        match result {
            Ok(message) => {
                if self.outbound.send(message).await.is_err() {
                    tracing::warn!("outbound channel closed, dropping removal");
                }
            }
            Err(err) => tracing::warn!("removal of {} failed: {err}", path.display()),
        }
    }
}

/// Terminal debounce fire: read the settled bytes and emit one push.
async fn push_file(
    directory: &Path,
    key: &SecretKey,
    outbound: &mpsc::Sender<Message>,
    path: &Path,
) -> Result<(), EdgeError> {
    let rel = relative_to(directory, path)?;
    let content = tokio::fs::read(path).await?;
    let record = ChangeRecord::now(rel, content);
    let payload = key.seal(record.encode().as_bytes())?;
    let message = Message::new(MessageKind::ClientPushContent, payload);

    if outbound.send(message).await.is_err() {
        tracing::warn!("outbound channel closed, dropping push");
    }
    Ok(())
}

/// The record path relative to the watched root.
fn relative_to(directory: &Path, path: &Path) -> Result<String, EdgeError> {
    let rel = path
        .strip_prefix(directory)
        .map_err(|_| EdgeError::OutsideWatchedDir(path.to_path_buf()))?;
    Ok(rel.to_string_lossy().into_owned())
}
