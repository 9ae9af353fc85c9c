//! Hub state and fan-out.
//!
//! The [`Hub`] owns the two pieces of shared state: the connection registry
//! and the pending-ack ledger. Sessions register on accept, dispatch into
//! the hub, and unregister on disconnect.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dirsync_types::{binary, ClientId, Message, MessageKind};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::{AckLedger, HubError};

/// One registered connection's write half.
///
/// The per-handle mutex keeps a directed reply and a broadcast from
/// interleaving bytes on the same socket.
type ClientHandle = Arc<Mutex<OwnedWriteHalf>>;

/// The central relay.
pub struct Hub {
    clients: DashMap<ClientId, ClientHandle>,
    ledger: AckLedger,
}

impl Hub {
    /// Create a hub staging in-flight payloads under `directory`.
    ///
    /// The directory is created if missing.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, HubError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            clients: DashMap::new(),
            ledger: AckLedger::new(directory),
        })
    }

    /// Accept connections forever, one session task per connection.
    ///
    /// Accept errors are logged and the loop continues.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<(), HubError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("hub listening on {addr}");
        }
        match binary::executable_version() {
            Ok(version) => tracing::info!("hub version {:?}", version),
            Err(err) => tracing::warn!("could not hash own executable: {err}"),
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let hub = self.clone();
                    tokio::spawn(async move {
                        crate::session::run(hub, stream, peer).await;
                    });
                }
                Err(err) => {
                    tracing::warn!("accept failed: {err}");
                }
            }
        }
    }

    /// Register a freshly accepted connection under a new id.
    pub(crate) fn register(&self, id: ClientId, writer: OwnedWriteHalf) {
        self.clients.insert(id.clone(), Arc::new(Mutex::new(writer)));
        tracing::info!("client connected: {:?} ({} online)", id, self.clients.len());
    }

    /// Drop a departed connection and scrub it from the ledger.
    pub(crate) fn unregister(&self, id: &ClientId) {
        self.clients.remove(id);
        self.ledger.forget_client(id);
        tracing::info!(
            "client disconnected: {:?} ({} online)",
            id,
            self.clients.len()
        );
    }

    /// Number of currently connected clients.
    pub fn online(&self) -> usize {
        self.clients.len()
    }

    /// The pending-ack ledger.
    pub fn ledger(&self) -> &AckLedger {
        &self.ledger
    }

    /// The staging directory.
    pub fn directory(&self) -> &Path {
        self.ledger.directory()
    }

    /// Best-effort fan-out to every connected client, origin included.
    ///
    /// The registry is snapshotted first; no registry lock is held during
    /// network writes. A failed write is logged and skipped without removing
    /// the client; its own reader notices the dead socket.
    pub(crate) async fn broadcast(&self, kind: MessageKind, payload: Vec<u8>) {
        let message = Message::new(kind, payload);
        let line = message.encode();

        let targets: Vec<(ClientId, ClientHandle)> = self
            .clients
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (id, handle) in targets {
            let mut writer = handle.lock().await;
            if let Err(err) = writer.write_all(line.as_bytes()).await {
                tracing::warn!("broadcast to {:?} failed: {err}", id);
            }
        }
    }

    /// Close every client socket.
    ///
    /// Sessions terminate via socket close; there is no graceful drain.
    pub async fn shutdown(&self) {
        let handles: Vec<ClientHandle> = self
            .clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for handle in handles {
            let mut writer = handle.lock().await;
            let _ = writer.shutdown().await;
        }
    }

    /// Send one message to one client.
    pub(crate) async fn send_to(&self, id: &ClientId, message: &Message) -> Result<(), HubError> {
        let handle = self
            .clients
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(HubError::ClientGone)?;

        let mut writer = handle.lock().await;
        writer.write_all(message.encode().as_bytes()).await?;
        Ok(())
    }
}
