//! The line-framed protocol messages.

use std::fmt;
use std::str::FromStr;

use crate::{Checksum, WireError};

/// The closed set of message tags.
///
/// Client-originated kinds travel edge → hub; server-originated kinds travel
/// hub → edge. The four content-bearing kinds carry an encrypted payload
/// whose plaintext is a [`ChangeRecord`](crate::ChangeRecord); all others
/// carry a plaintext payload or none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Edge confirms it applied a change; payload is the hex checksum of the
    /// encrypted payload as it was received.
    ClientAck,
    /// Edge pushes a changed file; payload is ciphertext.
    ClientPushContent,
    /// Edge reports a removed file; payload is ciphertext.
    ClientRemoveFile,
    /// Edge asks for the hub's executable hash; empty payload.
    ClientRequestServerVersion,
    /// Edge asks for the hub's executable bytes; empty payload.
    ClientRequestServerBinary,
    /// Hub fans a pushed change out to every edge; payload is ciphertext.
    ServerPushContent,
    /// Hub fans a removal out to every edge; payload is ciphertext.
    ServerRemoveFile,
    /// Hub answers a version request; payload is a hex SHA-512.
    ServerSendServerVersion,
    /// Hub answers a binary request; payload is the base64 executable.
    ServerSendServerBinary,
}

impl MessageKind {
    /// The wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientAck => "CLIENT_ACK",
            Self::ClientPushContent => "CLIENT_PUSH_CONTENT",
            Self::ClientRemoveFile => "CLIENT_REMOVE_FILE",
            Self::ClientRequestServerVersion => "CLIENT_REQUEST_SERVER_VERSION",
            Self::ClientRequestServerBinary => "CLIENT_REQUEST_SERVER_BINARY",
            Self::ServerPushContent => "SERVER_PUSH_CONTENT",
            Self::ServerRemoveFile => "SERVER_REMOVE_FILE",
            Self::ServerSendServerVersion => "SERVER_SEND_SERVER_VERSION",
            Self::ServerSendServerBinary => "SERVER_SEND_SERVER_BINARY",
        }
    }

    /// Whether this kind's payload is ciphertext wrapping a change record.
    pub fn is_content_bearing(&self) -> bool {
        matches!(
            self,
            Self::ClientPushContent
                | Self::ClientRemoveFile
                | Self::ServerPushContent
                | Self::ServerRemoveFile
        )
    }

    /// All kinds, for exhaustive round-trip tests.
    pub const ALL: [MessageKind; 9] = [
        Self::ClientAck,
        Self::ClientPushContent,
        Self::ClientRemoveFile,
        Self::ClientRequestServerVersion,
        Self::ClientRequestServerBinary,
        Self::ServerPushContent,
        Self::ServerRemoveFile,
        Self::ServerSendServerVersion,
        Self::ServerSendServerBinary,
    ];
}

impl FromStr for MessageKind {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLIENT_ACK" => Ok(Self::ClientAck),
            "CLIENT_PUSH_CONTENT" => Ok(Self::ClientPushContent),
            "CLIENT_REMOVE_FILE" => Ok(Self::ClientRemoveFile),
            "CLIENT_REQUEST_SERVER_VERSION" => Ok(Self::ClientRequestServerVersion),
            "CLIENT_REQUEST_SERVER_BINARY" => Ok(Self::ClientRequestServerBinary),
            "SERVER_PUSH_CONTENT" => Ok(Self::ServerPushContent),
            "SERVER_REMOVE_FILE" => Ok(Self::ServerRemoveFile),
            "SERVER_SEND_SERVER_VERSION" => Ok(Self::ServerSendServerVersion),
            "SERVER_SEND_SERVER_BINARY" => Ok(Self::ServerSendServerBinary),
            other => Err(WireError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One framed protocol message.
///
/// `claimed_checksum` is what the peer wrote on the wire; a message is
/// well-formed iff it matches the recomputed checksum of `payload`.
#[derive(Debug, Clone)]
pub struct Message {
    /// The message tag.
    pub kind: MessageKind,
    /// Kind-dependent payload bytes, exactly as framed.
    pub payload: Vec<u8>,
    /// The checksum field as received; populated at emit time when sending.
    pub claimed_checksum: Checksum,
}

impl Message {
    /// Build a message to send. The checksum is computed from the payload.
    pub fn new(kind: MessageKind, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        let claimed_checksum = Checksum::of(&payload);
        Self {
            kind,
            payload,
            claimed_checksum,
        }
    }

    /// Build a `CLIENT_ACK` for the given payload checksum.
    pub fn ack(checksum: &Checksum) -> Self {
        Self::new(MessageKind::ClientAck, checksum.as_str().as_bytes())
    }

    /// Checksum of this message's payload bytes.
    pub fn payload_checksum(&self) -> Checksum {
        Checksum::of(&self.payload)
    }

    /// Whether the claimed checksum matches the payload.
    pub fn verify_checksum(&self) -> bool {
        self.claimed_checksum == self.payload_checksum()
    }

    /// Parse one wire line (without requiring the trailing newline).
    ///
    /// The line must split into exactly three fields on the first two
    /// spaces; the payload field may be empty. The checksum is NOT verified
    /// here; callers decide whether to drop mismatches.
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = line.splitn(3, ' ');
        let (kind, payload, checksum) = match (fields.next(), fields.next(), fields.next()) {
            (Some(k), Some(p), Some(c)) if !c.is_empty() => (k, p, c),
            _ => return Err(WireError::Malformed(abbreviate(line))),
        };
        Ok(Self {
            kind: kind.parse()?,
            payload: payload.as_bytes().to_vec(),
            claimed_checksum: Checksum::from_hex(checksum),
        })
    }

    /// Serialize to the full `KIND PAYLOAD CHECKSUM\n` line.
    ///
    /// The checksum field is recomputed over the payload at emit time.
    pub fn encode(&self) -> String {
        let checksum = self.payload_checksum();
        let payload = String::from_utf8_lossy(&self.payload);
        format!("{} {} {}\n", self.kind, payload, checksum)
    }
}

/// Shorten a line for inclusion in an error.
fn abbreviate(line: &str) -> String {
    const MAX: usize = 80;
    if line.len() <= MAX {
        line.to_string()
    } else {
        let head: String = line.chars().take(MAX).collect();
        format!("{head}...")
    }
}
