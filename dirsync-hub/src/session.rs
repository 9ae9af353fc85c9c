//! Per-connection hub session.
//!
//! Each accepted connection gets a read loop that consumes framed lines,
//! validates checksums, and dispatches by kind. Malformed or tampered
//! messages are dropped with a log line; only a transport error ends the
//! session.

use std::net::SocketAddr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dirsync_types::{binary, Checksum, ClientId, Message, MessageKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

use crate::{Hub, HubError};

/// Drive one connection until its transport fails or closes.
pub(crate) async fn run(hub: Arc<Hub>, stream: TcpStream, peer: SocketAddr) {
    let (read_half, write_half) = stream.into_split();
    let id = ClientId::random();
    hub.register(id.clone(), write_half);
    tracing::debug!("session for {peer} is {:?}", id);

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let message = match Message::parse(&line) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!("invalid message from {:?}: {err}", id);
                continue;
            }
        };
        if !message.verify_checksum() {
            tracing::warn!("checksum mismatch from {:?}, dropping", id);
            continue;
        }

        if let Err(err) = dispatch(&hub, &id, message).await {
            tracing::warn!("error handling message from {:?}: {err}", id);
        }
    }

    hub.unregister(&id);
}

/// The hub's dispatch table.
async fn dispatch(hub: &Hub, id: &ClientId, message: Message) -> Result<(), HubError> {
    match message.kind {
        MessageKind::ClientPushContent => handle_push(hub, message).await,
        MessageKind::ClientRemoveFile => handle_remove(hub, message).await,
        MessageKind::ClientAck => handle_ack(hub, id, &message).await,
        MessageKind::ClientRequestServerVersion => handle_version_request(hub, id).await,
        MessageKind::ClientRequestServerBinary => handle_binary_request(hub, id).await,
        other => {
            tracing::warn!("unexpected kind {other} from {:?}, dropping", id);
            Ok(())
        }
    }
}

/// Stage the opaque payload, open a ledger entry, fan out.
async fn handle_push(hub: &Hub, message: Message) -> Result<(), HubError> {
    let checksum = message.payload_checksum();
    hub.ledger().open(&checksum, Some(&message.payload)).await?;
    tracing::debug!("push {:?} fanned out to {} clients", checksum, hub.online());
    hub.broadcast(MessageKind::ServerPushContent, message.payload)
        .await;
    Ok(())
}

/// Open a ledger entry (no staging file) and fan out the removal.
async fn handle_remove(hub: &Hub, message: Message) -> Result<(), HubError> {
    let checksum = message.payload_checksum();
    hub.ledger().open(&checksum, None).await?;
    hub.broadcast(MessageKind::ServerRemoveFile, message.payload)
        .await;
    Ok(())
}

/// Record an ack against the live connection count.
async fn handle_ack(hub: &Hub, id: &ClientId, message: &Message) -> Result<(), HubError> {
    let checksum = Checksum::from_hex(String::from_utf8_lossy(&message.payload).into_owned());
    hub.ledger()
        .record_ack(&checksum, id, hub.online())
        .await?;
    Ok(())
}

/// Reply with the hex SHA-512 of the hub's own executable.
async fn handle_version_request(hub: &Hub, id: &ClientId) -> Result<(), HubError> {
    let version = binary::executable_version()?;
    let reply = Message::new(
        MessageKind::ServerSendServerVersion,
        version.as_str().as_bytes(),
    );
    hub.send_to(id, &reply).await
}

/// Reply with the base64 of the hub's own executable bytes.
async fn handle_binary_request(hub: &Hub, id: &ClientId) -> Result<(), HubError> {
    let bytes = binary::executable_bytes()?;
    let reply = Message::new(MessageKind::ServerSendServerBinary, BASE64.encode(bytes));
    hub.send_to(id, &reply).await
}
