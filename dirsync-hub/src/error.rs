//! Error types for dirsync-hub.

use dirsync_types::WireError;
use thiserror::Error;

/// Errors surfaced by hub operations.
///
/// None of these terminate a running session except I/O errors on the
/// session's own transport; handlers log the rest and keep reading.
#[derive(Debug, Error)]
pub enum HubError {
    /// Transport or staging-file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire-format error.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// An ack arrived for a checksum with no ledger entry.
    #[error("no pending acknowledgments for checksum {0}")]
    UnknownAck(String),

    /// An ack payload was too short to be a checksum.
    #[error("ack checksum too short: {len} characters")]
    AckTooShort {
        /// Length of the rejected payload.
        len: usize,
    },

    /// A directed reply targeted a client that is no longer registered.
    #[error("client not connected")]
    ClientGone,
}
