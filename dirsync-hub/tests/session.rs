//! Session tests against a live hub on a loopback socket.

use std::sync::Arc;
use std::time::Duration;

use dirsync_hub::Hub;
use dirsync_types::{binary, Checksum, Message, MessageKind};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    async fn send(&mut self, message: &Message) {
        self.writer
            .write_all(message.encode().as_bytes())
            .await
            .unwrap();
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn recv(&mut self) -> Message {
        let mut line = String::new();
        timeout(Duration::from_secs(30), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a message")
            .unwrap();
        Message::parse(&line).unwrap()
    }
}

async fn start_hub() -> (Arc<Hub>, std::net::SocketAddr, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let hub = Arc::new(Hub::new(dir.path().join("staging")).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(hub.clone().run(listener));
    (hub, addr, dir)
}

/// Poll until `predicate` holds or the deadline passes.
async fn wait_for(mut predicate: impl FnMut() -> bool) {
    for _ in 0..250 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn push_fans_out_to_all_clients_including_origin() {
    let (hub, addr, _dir) = start_hub().await;
    let mut origin = TestClient::connect(addr).await;
    let mut other = TestClient::connect(addr).await;
    wait_for(|| hub.online() == 2).await;

    let payload = b"opaque-ciphertext".to_vec();
    origin
        .send(&Message::new(MessageKind::ClientPushContent, payload.clone()))
        .await;

    for client in [&mut origin, &mut other] {
        let received = client.recv().await;
        assert_eq!(received.kind, MessageKind::ServerPushContent);
        assert_eq!(received.payload, payload);
        assert!(received.verify_checksum());
    }
}

#[tokio::test]
async fn full_ack_cycle_empties_staging_dir() {
    let (hub, addr, _dir) = start_hub().await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    wait_for(|| hub.online() == 2).await;

    let payload = b"change-bytes".to_vec();
    let checksum = Checksum::of(&payload);
    a.send(&Message::new(MessageKind::ClientPushContent, payload))
        .await;

    // Both clients receive the fan-out and ack with the payload checksum.
    for client in [&mut a, &mut b] {
        let received = client.recv().await;
        client.send(&Message::ack(&received.payload_checksum())).await;
    }

    let staged = hub.ledger().stage_path(&checksum);
    wait_for(|| !staged.exists()).await;
    assert_eq!(hub.ledger().pending(), 0);
}

#[tokio::test]
async fn remove_fans_out_without_staging() {
    let (hub, addr, _dir) = start_hub().await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    wait_for(|| hub.online() == 2).await;

    let payload = b"removal-record".to_vec();
    let checksum = Checksum::of(&payload);
    a.send(&Message::new(MessageKind::ClientRemoveFile, payload.clone()))
        .await;

    let received = b.recv().await;
    assert_eq!(received.kind, MessageKind::ServerRemoveFile);
    assert_eq!(received.payload, payload);
    assert!(!hub.ledger().stage_path(&checksum).exists());
}

#[tokio::test]
async fn tampered_checksum_is_dropped_and_session_continues() {
    let (hub, addr, _dir) = start_hub().await;
    let mut client = TestClient::connect(addr).await;
    wait_for(|| hub.online() == 1).await;

    // Claimed checksum does not match the payload.
    let bogus = format!("CLIENT_PUSH_CONTENT payload {}\n", "0".repeat(128));
    client.send_raw(&bogus).await;

    // The session survives: a valid push still round-trips.
    let payload = b"still-alive".to_vec();
    client
        .send(&Message::new(MessageKind::ClientPushContent, payload.clone()))
        .await;
    let received = client.recv().await;
    assert_eq!(received.payload, payload);
    assert_eq!(hub.ledger().pending(), 1);
}

#[tokio::test]
async fn malformed_and_unknown_lines_are_dropped() {
    let (hub, addr, _dir) = start_hub().await;
    let mut client = TestClient::connect(addr).await;
    wait_for(|| hub.online() == 1).await;

    client.send_raw("nonsense\n").await;
    client.send_raw("SOME_FUTURE_KIND abc def\n").await;

    client
        .send(&Message::new(MessageKind::ClientRequestServerVersion, Vec::new()))
        .await;
    let reply = client.recv().await;
    assert_eq!(reply.kind, MessageKind::ServerSendServerVersion);
}

#[tokio::test]
async fn version_request_answers_with_executable_hash() {
    let (_hub, addr, _dir) = start_hub().await;
    let mut client = TestClient::connect(addr).await;

    client
        .send(&Message::new(MessageKind::ClientRequestServerVersion, Vec::new()))
        .await;

    let reply = client.recv().await;
    assert_eq!(reply.kind, MessageKind::ServerSendServerVersion);
    let expected = binary::executable_version().unwrap();
    assert_eq!(reply.payload, expected.as_str().as_bytes());
}

#[tokio::test]
async fn binary_request_serves_the_executable_bytes() {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    let (_hub, addr, _dir) = start_hub().await;
    let mut client = TestClient::connect(addr).await;

    client
        .send(&Message::new(MessageKind::ClientRequestServerBinary, Vec::new()))
        .await;

    let reply = client.recv().await;
    assert_eq!(reply.kind, MessageKind::ServerSendServerBinary);
    assert!(reply.verify_checksum());
    let served = BASE64.decode(&reply.payload).unwrap();
    assert_eq!(served, binary::executable_bytes().unwrap());
}

#[tokio::test]
async fn disconnect_scrubs_client_from_registry() {
    let (hub, addr, _dir) = start_hub().await;
    let client = TestClient::connect(addr).await;
    wait_for(|| hub.online() == 1).await;

    drop(client);
    wait_for(|| hub.online() == 0).await;
}

#[tokio::test]
async fn entry_completes_early_when_a_client_disconnects() {
    let (hub, addr, _dir) = start_hub().await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    wait_for(|| hub.online() == 2).await;

    let payload = b"change".to_vec();
    a.send(&Message::new(MessageKind::ClientPushContent, payload))
        .await;
    let received = a.recv().await;
    let _ = b.recv().await;
    let ack = Message::ack(&received.payload_checksum());

    // One ack of two: the entry stays open.
    a.send(&ack).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hub.ledger().pending(), 1);

    // B leaves; cardinality is measured live, so the next arriving ack
    // (a duplicate from A) completes the entry against a count of one.
    drop(b);
    wait_for(|| hub.online() == 1).await;
    a.send(&ack).await;
    wait_for(|| hub.ledger().pending() == 0).await;
}
