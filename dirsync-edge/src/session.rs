//! The edge session: reconnect loop, inbound dispatch, outbound drain.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use dirsync_types::{binary, ChangeRecord, Message, MessageKind};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::{update, watch, EdgeError, SecretKey};

/// Delay between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Mode bits for files written by an inbound apply.
#[cfg(unix)]
const APPLY_MODE: u32 = 0o644;

/// Everything an edge session needs to run.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    /// The directory to watch and mirror.
    pub directory: PathBuf,
    /// Hub address to dial, e.g. `127.0.0.1:9000`.
    pub server_addr: String,
    /// The pre-shared content key.
    pub key: SecretKey,
    /// Where to record the time of the last successful inbound apply.
    pub last_sync_path: PathBuf,
}

impl EdgeConfig {
    /// A config with the conventional `./.last-sync` bookkeeping file.
    pub fn new(directory: PathBuf, server_addr: String, key: SecretKey) -> Self {
        Self {
            directory,
            server_addr,
            key,
            last_sync_path: PathBuf::from(".last-sync"),
        }
    }
}

/// Run an edge session until the process ends.
///
/// Starts the watcher, then loops forever: dial the hub (retrying every
/// second), request the hub's version, and drive the connection until the
/// transport fails, at which point the loop dials again. Debounce timers and
/// queued outbound messages survive reconnects.
pub async fn run(config: EdgeConfig) -> Result<(), EdgeError> {
    tokio::fs::create_dir_all(&config.directory).await?;
    let directory = config.directory.canonicalize()?;

    let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(256);
    let _watch = watch::spawn(directory.clone(), config.key.clone(), outbound_tx)?;

    let mut session = EdgeSession {
        directory,
        key: config.key,
        last_sync_path: config.last_sync_path,
        outbound: outbound_rx,
    };

    loop {
        let stream = connect(&config.server_addr).await;
        if let Err(err) = session.drive(stream).await {
            tracing::warn!("connection lost: {err}; reconnecting");
        }
    }
}

/// Dial until the hub answers. Never gives up.
async fn connect(addr: &str) -> TcpStream {
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tracing::info!("connected to hub at {addr}");
                return stream;
            }
            Err(err) => {
                tracing::warn!("connect to {addr} failed: {err}; retrying in 1s");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

struct EdgeSession {
    directory: PathBuf,
    key: SecretKey,
    last_sync_path: PathBuf,
    outbound: mpsc::Receiver<Message>,
}

impl EdgeSession {
    /// Drive one connection until its transport fails.
    ///
    /// The returned error is always transport-level; handler errors are
    /// logged here and the session keeps reading.
    async fn drive(&mut self, stream: TcpStream) -> Result<(), EdgeError> {
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        send(&mut writer, Message::new(MessageKind::ClientRequestServerVersion, Vec::new()))
            .await?;

        loop {
            line.clear();
            tokio::select! {
                read = reader.read_line(&mut line) => {
                    match read {
                        Ok(0) => return Err(EdgeError::Io(std::io::ErrorKind::UnexpectedEof.into())),
                        Ok(_) => {}
                        Err(err) => return Err(err.into()),
                    }
                    if let Err(err) = self.handle_line(&line, &mut writer).await {
                        tracing::warn!("error handling message: {err}");
                    }
                }
                Some(message) = self.outbound.recv() => {
                    // A failed send loses the message; the read side notices
                    // the dead socket and triggers the reconnect.
                    if let Err(err) = send(&mut writer, message).await {
                        tracing::warn!("outbound send failed: {err}");
                    }
                }
            }
        }
    }

    /// Parse, validate, and dispatch one inbound line.
    async fn handle_line(&self, line: &str, writer: &mut OwnedWriteHalf) -> Result<(), EdgeError> {
        let message = match Message::parse(line) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!("invalid message: {err}");
                return Ok(());
            }
        };
        if !message.verify_checksum() {
            tracing::warn!("checksum mismatch, dropping");
            return Ok(());
        }

        match message.kind {
            MessageKind::ServerPushContent => self.apply_push(&message, writer).await?,
            MessageKind::ServerRemoveFile => self.apply_remove(&message, writer).await?,
            MessageKind::ServerSendServerVersion => {
                self.handle_version(&message, writer).await?
            }
            MessageKind::ServerSendServerBinary => {
                // Returns only on failure; success replaces the process.
                if let Err(err) = update::self_update(&message.payload) {
                    tracing::warn!("self-update failed, staying on current build: {err}");
                    return Ok(());
                }
            }
            other => {
                tracing::warn!("unexpected kind {other}, dropping");
                return Ok(());
            }
        }

        self.stamp_last_sync().await;
        Ok(())
    }

    /// Apply an inbound content push and ack it.
    ///
    /// The file is rewritten only when its bytes differ, so the echo of this
    /// edge's own push lands as a no-op write plus an ack. The ack carries
    /// the checksum of the payload as transmitted; that is the hub's ledger
    /// key.
    async fn apply_push(
        &self,
        message: &Message,
        writer: &mut OwnedWriteHalf,
    ) -> Result<(), EdgeError> {
        let record = self.open_record(message)?;
        let target = self.directory.join(&record.path);

        let existing = match tokio::fs::read(&target).await {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        if existing.as_deref() != Some(record.content.as_slice()) {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            write_file(&target, &record.content).await?;
            tracing::info!("applied {} ({} bytes)", record.path, record.content.len());
        }

        send(writer, Message::ack(&message.payload_checksum())).await
    }

    /// Apply an inbound removal and ack it. A missing file is fine.
    async fn apply_remove(
        &self,
        message: &Message,
        writer: &mut OwnedWriteHalf,
    ) -> Result<(), EdgeError> {
        let record = self.open_record(message)?;
        let target = self.directory.join(&record.path);

        match tokio::fs::remove_file(&target).await {
            Ok(()) => tracing::info!("removed {}", record.path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        send(writer, Message::ack(&message.payload_checksum())).await
    }

    /// Compare the hub's build hash with our own; request the binary when
    /// they differ.
    async fn handle_version(
        &self,
        message: &Message,
        writer: &mut OwnedWriteHalf,
    ) -> Result<(), EdgeError> {
        let hub_version = String::from_utf8_lossy(&message.payload);
        if update::is_up_to_date(&hub_version)? {
            tracing::info!("running the hub's build already");
            return Ok(());
        }
        tracing::info!("hub runs a different build, requesting it");
        send(
            writer,
            Message::new(MessageKind::ClientRequestServerBinary, Vec::new()),
        )
        .await
    }

    /// Decrypt and parse a content-bearing payload.
    fn open_record(&self, message: &Message) -> Result<ChangeRecord, EdgeError> {
        let payload = String::from_utf8_lossy(&message.payload);
        let plaintext = self.key.open(&payload)?;
        Ok(ChangeRecord::parse(&String::from_utf8_lossy(&plaintext))?)
    }

    /// Overwrite the bookkeeping file with the current time.
    ///
    /// Purely observational; nothing reads it back, so failure is only
    /// logged.
    async fn stamp_last_sync(&self) {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        if let Err(err) = tokio::fs::write(&self.last_sync_path, now).await {
            tracing::warn!("failed to record last sync time: {err}");
        }
    }
}

/// Frame and send one message; a partial write is an error.
async fn send(writer: &mut OwnedWriteHalf, message: Message) -> Result<(), EdgeError> {
    writer.write_all(message.encode().as_bytes()).await?;
    Ok(())
}

/// Write an applied file with the conventional mirror permissions.
async fn write_file(target: &Path, content: &[u8]) -> Result<(), EdgeError> {
    tokio::fs::write(target, content).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(target, std::fs::Permissions::from_mode(APPLY_MODE)).await?;
    }
    Ok(())
}
