//! Error types for the dirsync wire format.

use thiserror::Error;

/// Errors produced while parsing or validating wire data.
#[derive(Debug, Error)]
pub enum WireError {
    /// A line did not split into the three `KIND PAYLOAD CHECKSUM` fields.
    #[error("malformed message line: {0:?}")]
    Malformed(String),

    /// The kind tag is not part of the protocol.
    #[error("unknown message kind: {0:?}")]
    UnknownKind(String),

    /// The recomputed payload checksum differs from the claimed one.
    #[error("payload checksum does not match claimed checksum")]
    ChecksumMismatch,

    /// A change record did not split into its three fields.
    #[error("malformed change record")]
    MalformedRecord,

    /// A base64 field inside a change record failed to decode.
    #[error("invalid base64 in {field}: {source}")]
    InvalidBase64 {
        /// Which record field was being decoded.
        field: &'static str,
        /// Underlying decode error.
        source: base64::DecodeError,
    },

    /// The record timestamp is not RFC3339.
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// A record path decoded to invalid UTF-8.
    #[error("record path is not valid UTF-8")]
    InvalidPath,

    /// Reading the running executable failed.
    #[error("failed to read running executable: {0}")]
    Executable(#[source] std::io::Error),
}
