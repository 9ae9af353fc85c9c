//! # dirsync-edge
//!
//! The edge side of dirsync: watches a local directory, pushes encrypted
//! change records to the hub, applies inbound changes from other edges, and
//! keeps itself on the hub's build via the self-update exchange.
//!
//! An edge session is two cooperating halves sharing one TCP connection:
//! the inbound half reads framed lines and applies them, the outbound half
//! is fed by the filesystem watcher through a channel. The connection is
//! replaced transparently by the reconnect loop; watcher state survives.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod crypto;
mod error;
mod session;
mod update;
mod watch;

pub use crypto::{CryptoError, SecretKey};
pub use error::EdgeError;
pub use session::{run, EdgeConfig};
