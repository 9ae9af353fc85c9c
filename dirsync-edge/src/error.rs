//! Error types for dirsync-edge.

use dirsync_types::WireError;
use thiserror::Error;

use crate::CryptoError;

/// Errors surfaced by edge operations.
///
/// Only transport errors end the inner session loop (and feed the reconnect
/// loop); everything else is logged at the point of handling and the session
/// keeps running.
#[derive(Debug, Error)]
pub enum EdgeError {
    /// Transport or local filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire-format error.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Payload encryption or decryption failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The filesystem watcher failed.
    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// A watched path fell outside the synced directory.
    #[error("path is outside the watched directory: {0}")]
    OutsideWatchedDir(std::path::PathBuf),

    /// A received binary payload was not valid base64.
    #[error("invalid base64 in binary payload: {0}")]
    BinaryEncoding(#[from] base64::DecodeError),
}
