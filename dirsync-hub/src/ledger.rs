//! The pending-ack ledger.
//!
//! Every change the hub fans out gets a ledger entry keyed by the checksum
//! of its encrypted payload, holding the set of clients that have confirmed
//! applying it. Push payloads are additionally staged on disk under
//! `<dir>/<checksum>` until every currently connected client has acked, at
//! which point the entry and the staging file are removed together.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use dirsync_types::{Checksum, ClientId};

use crate::HubError;

/// Minimum plausible length for an ack checksum payload.
const MIN_ACK_LEN: usize = 10;

/// Checksum → set of clients that have acknowledged that change.
pub struct AckLedger {
    directory: PathBuf,
    entries: DashMap<Checksum, HashSet<ClientId>>,
}

impl AckLedger {
    /// Create a ledger staging files under `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            entries: DashMap::new(),
        }
    }

    /// Path of the staging file for a checksum.
    pub fn stage_path(&self, checksum: &Checksum) -> PathBuf {
        self.directory.join(checksum.as_str())
    }

    /// Open a ledger entry for a change about to be fanned out.
    ///
    /// For pushes the opaque payload is staged on disk first; removals track
    /// acks only. An existing entry for the same checksum is reset, matching
    /// a re-push of identical bytes.
    pub async fn open(
        &self,
        checksum: &Checksum,
        staged_payload: Option<&[u8]>,
    ) -> Result<(), HubError> {
        if let Some(payload) = staged_payload {
            tokio::fs::write(self.stage_path(checksum), payload).await?;
        }
        self.entries.insert(checksum.clone(), HashSet::new());
        Ok(())
    }

    /// Record one client's acknowledgment.
    ///
    /// `live_clients` is the number of currently connected clients; when the
    /// ack set reaches that cardinality the entry is retired and the staging
    /// file (if any) unlinked. Returns whether the entry completed. A missing
    /// staging file is not an error; an unknown checksum is.
    pub async fn record_ack(
        &self,
        checksum: &Checksum,
        client: &ClientId,
        live_clients: usize,
    ) -> Result<bool, HubError> {
        if checksum.len() < MIN_ACK_LEN {
            return Err(HubError::AckTooShort {
                len: checksum.len(),
            });
        }

        let complete = {
            let mut entry = self
                .entries
                .get_mut(checksum)
                .ok_or_else(|| HubError::UnknownAck(checksum.to_string()))?;
            entry.insert(client.clone());
            entry.len() == live_clients
        };

        if complete {
            self.entries.remove(checksum);
            if let Err(err) = tokio::fs::remove_file(self.stage_path(checksum)).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    return Err(err.into());
                }
            }
            tracing::info!("all clients acknowledged {:?}", checksum);
        }
        Ok(complete)
    }

    /// Scrub a departing client from every entry.
    ///
    /// Entries are never completed here, only shrunk; the next ack measures
    /// cardinality against the then-current connection count.
    pub fn forget_client(&self, client: &ClientId) {
        for mut entry in self.entries.iter_mut() {
            entry.remove(client);
        }
    }

    /// Number of open entries.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Whether a checksum has an open entry.
    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.entries.contains_key(checksum)
    }

    /// The staging directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> (tempfile::TempDir, AckLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = AckLedger::new(dir.path());
        (dir, ledger)
    }

    #[tokio::test]
    async fn push_entry_stages_payload_on_disk() {
        let (_dir, ledger) = ledger();
        let payload = b"opaque-bytes";
        let checksum = Checksum::of(payload);

        ledger.open(&checksum, Some(payload)).await.unwrap();

        assert!(ledger.contains(&checksum));
        let staged = std::fs::read(ledger.stage_path(&checksum)).unwrap();
        assert_eq!(staged, payload);
    }

    #[tokio::test]
    async fn remove_entry_has_no_staging_file() {
        let (_dir, ledger) = ledger();
        let checksum = Checksum::of(b"remove-payload");

        ledger.open(&checksum, None).await.unwrap();

        assert!(ledger.contains(&checksum));
        assert!(!ledger.stage_path(&checksum).exists());
    }

    #[tokio::test]
    async fn full_ack_retires_entry_and_staging_file() {
        let (_dir, ledger) = ledger();
        let payload = b"payload";
        let checksum = Checksum::of(payload);
        let (a, b) = (ClientId::random(), ClientId::random());

        ledger.open(&checksum, Some(payload)).await.unwrap();

        assert!(!ledger.record_ack(&checksum, &a, 2).await.unwrap());
        assert!(ledger.contains(&checksum));
        assert!(ledger.stage_path(&checksum).exists());

        assert!(ledger.record_ack(&checksum, &b, 2).await.unwrap());
        assert!(!ledger.contains(&checksum));
        assert!(!ledger.stage_path(&checksum).exists());
    }

    #[tokio::test]
    async fn duplicate_acks_count_once() {
        let (_dir, ledger) = ledger();
        let checksum = Checksum::of(b"x");
        let a = ClientId::random();

        ledger.open(&checksum, None).await.unwrap();
        assert!(!ledger.record_ack(&checksum, &a, 2).await.unwrap());
        assert!(!ledger.record_ack(&checksum, &a, 2).await.unwrap());
        assert!(ledger.contains(&checksum));
    }

    #[tokio::test]
    async fn missing_staging_file_is_tolerated() {
        let (_dir, ledger) = ledger();
        let checksum = Checksum::of(b"never-staged");
        let a = ClientId::random();

        ledger.open(&checksum, None).await.unwrap();
        assert!(ledger.record_ack(&checksum, &a, 1).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_checksum_errors() {
        let (_dir, ledger) = ledger();
        let err = ledger
            .record_ack(&Checksum::of(b"never-opened"), &ClientId::random(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::UnknownAck(_)));
    }

    #[tokio::test]
    async fn short_checksum_rejected() {
        let (_dir, ledger) = ledger();
        let err = ledger
            .record_ack(&Checksum::from_hex("abc"), &ClientId::random(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::AckTooShort { len: 3 }));
    }

    #[tokio::test]
    async fn forget_client_shrinks_without_completing() {
        let (_dir, ledger) = ledger();
        let checksum = Checksum::of(b"y");
        let (a, b) = (ClientId::random(), ClientId::random());

        ledger.open(&checksum, None).await.unwrap();
        ledger.record_ack(&checksum, &a, 2).await.unwrap();
        ledger.forget_client(&a);

        // The entry persists with one less acknowledger.
        assert!(ledger.contains(&checksum));

        // The next ack measures against the live count (now 1).
        assert!(ledger.record_ack(&checksum, &b, 1).await.unwrap());
        assert!(!ledger.contains(&checksum));
    }

    #[tokio::test]
    async fn reopen_resets_ack_set() {
        let (_dir, ledger) = ledger();
        let payload = b"same-bytes";
        let checksum = Checksum::of(payload);
        let a = ClientId::random();

        ledger.open(&checksum, Some(payload)).await.unwrap();
        ledger.record_ack(&checksum, &a, 2).await.unwrap();

        ledger.open(&checksum, Some(payload)).await.unwrap();
        // The earlier ack was discarded with the old set.
        assert!(!ledger.record_ack(&checksum, &a, 2).await.unwrap());
    }
}
