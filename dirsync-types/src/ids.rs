//! Integrity and identity types for dirsync.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha512};
use std::fmt;

/// Length of a minted [`ClientId`] in characters.
const CLIENT_ID_LEN: usize = 256;

/// A hex-encoded SHA-512 digest.
///
/// Used three ways: as the per-message integrity tag, as the key of the
/// hub's pending-ack ledger, and as the filename under which the hub stages
/// an in-flight payload.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Checksum(String);

impl Checksum {
    /// Compute the checksum of a byte sequence.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already hex-encoded digest, e.g. one received as an ack
    /// payload. No validation happens here; the ledger simply will not
    /// contain entries for garbage keys.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest length in characters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the digest string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // from_hex can wrap arbitrary wire input, so truncate by chars.
        let head: String = self.0.chars().take(10).collect();
        write!(f, "Checksum({head})")
    }
}

/// A hub-assigned random token identifying one connected edge session.
///
/// 256 alphanumeric characters. Lives exactly as long as the connection and
/// is discarded on disconnect.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Mint a fresh random identifier.
    pub fn random() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CLIENT_ID_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// The token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", &self.0[..self.0.len().min(10)])
    }
}
