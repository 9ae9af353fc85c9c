//! # dirsync-hub
//!
//! The hub side of dirsync: accepts TCP connections from edge replicas,
//! validates and dispatches framed messages, fans pushed changes out to
//! every connected edge, and tracks per-change acknowledgments in a ledger
//! backed by on-disk staging files.
//!
//! The hub never decrypts content payloads. It routes opaque ciphertexts and
//! keys all bookkeeping by their SHA-512 checksums.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ledger;
mod server;
mod session;

pub use error::HubError;
pub use ledger::AckLedger;
pub use server::Hub;
