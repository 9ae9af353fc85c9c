//! # dirsync-types
//!
//! Wire format types for the dirsync protocol.
//!
//! This crate provides the foundational types used across all dirsync crates:
//! - [`Checksum`], [`ClientId`] - integrity tags and session identifiers
//! - [`Message`], [`MessageKind`] - the line-framed protocol messages
//! - [`ChangeRecord`] - the plaintext carried inside encrypted payloads
//! - [`WireError`] - error types
//!
//! One message occupies one line: `KIND PAYLOAD CHECKSUM\n`, where the
//! checksum is the hex SHA-512 of the payload field exactly as it appears on
//! the wire. Content-bearing payloads are ciphertext and stay opaque to the
//! hub; it routes them and tracks their checksums without ever decrypting.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binary;
mod ids;
mod message;
mod record;

mod error;

pub use error::WireError;
pub use ids::{Checksum, ClientId};
pub use message::{Message, MessageKind};
pub use record::ChangeRecord;
