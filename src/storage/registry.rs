//! Concurrent document registry
//!
//! The registry owns the id → record table. All reads and mutations go
//! through one `parking_lot::RwLock`: readers proceed together, a writer
//! excludes everything else, and every mutation sets the dirty flag and
//! invalidates the ranking cache inside the same critical section, so no
//! observer can see a changed record alongside a stale-valid cache.
//!
//! Blob I/O always happens outside the lock; the lock is never held
//! across an await point. After each successful mutation the registry
//! fires best-effort change signals: a capacity-1 save trigger consumed
//! by the persistence manager and a bounded update nudge consumed by the
//! update poller. Full channels drop the signal; the periodic timers on
//! the receiving side are the backstop.

use crate::storage::blobs::BlobStore;
use crate::storage::ranking::RankingCache;
use crate::system::metrics::Metrics;
use crate::types::{generate_doc_id, DocumentRecord, Error, Result};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::collections::HashMap;
use tracing::{debug, info};

/// Capacity of the update-nudge mailbox. Extra nudges while the poller
/// is behind are dropped; the poll interval catches up.
const UPDATE_MAILBOX_CAPACITY: usize = 100;

/// Text content reads are truncated beyond this many bytes
const MAX_CONTENT_READ: usize = 100 * 1024;

/// Receiving ends of the registry's change signals
pub struct ChangeListeners {
    /// Debounced save trigger for the persistence manager
    pub save_rx: flume::Receiver<()>,
    /// Update nudge for the poller
    pub update_rx: flume::Receiver<()>,
}

/// Best-effort signal path from registry mutations to the background
/// loops. Sends never block: a full mailbox means the signal is dropped.
struct ChangeNotifier {
    save_tx: flume::Sender<()>,
    update_tx: flume::Sender<()>,
}

impl ChangeNotifier {
    fn channels() -> (Self, ChangeListeners) {
        let (save_tx, save_rx) = flume::bounded(1);
        let (update_tx, update_rx) = flume::bounded(UPDATE_MAILBOX_CAPACITY);
        (
            Self { save_tx, update_tx },
            ChangeListeners { save_rx, update_rx },
        )
    }

    fn notify(&self) {
        let _ = self.save_tx.try_send(());
        let _ = self.update_tx.try_send(());
    }
}

/// State guarded by the table lock: the record map, the derived ranking
/// cache, and the dirty flag tracking divergence from the last snapshot.
struct TableState {
    records: HashMap<String, DocumentRecord>,
    ranking: RankingCache,
    dirty: bool,
}

impl TableState {
    /// Rebuild the ranking from the live records. Split borrows keep the
    /// cache and the map independently mutable.
    fn rebuild_ranking(&mut self) {
        let TableState { records, ranking, .. } = self;
        ranking.rebuild(records.values());
        Metrics::global().ranking_rebuilds.inc();
    }

    /// Flag the table as changed; part of every writer's critical section
    fn touch(&mut self) {
        self.dirty = true;
        self.ranking.invalidate();
    }
}

/// Shared in-memory table of document records
pub struct DocumentRegistry {
    table: RwLock<TableState>,
    blobs: BlobStore,
    notifier: ChangeNotifier,
}

impl DocumentRegistry {
    /// Create an empty registry over the given blob store
    pub fn new(blobs: BlobStore) -> (Self, ChangeListeners) {
        Self::with_records(blobs, Vec::new())
    }

    /// Create a registry seeded with records loaded from a snapshot.
    /// The table starts clean (not dirty) and the ranking is built on
    /// first read.
    pub fn with_records(
        blobs: BlobStore,
        records: Vec<DocumentRecord>,
    ) -> (Self, ChangeListeners) {
        let records: HashMap<String, DocumentRecord> =
            records.into_iter().map(|r| (r.id.clone(), r)).collect();
        let (notifier, listeners) = ChangeNotifier::channels();
        let registry = Self {
            table: RwLock::new(TableState {
                records,
                ranking: RankingCache::new(),
                dirty: false,
            }),
            blobs,
            notifier,
        };
        (registry, listeners)
    }

    /// Blob store backing this registry
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Create a document from textual content
    pub async fn create(&self, name: &str, content: &str) -> Result<DocumentRecord> {
        self.create_from_bytes(name, content.as_bytes()).await
    }

    /// Create a document from binary content (the upload path).
    ///
    /// Allocates a fresh id and blob path, writes the content, then
    /// inserts the record. A failed blob write surfaces before the table
    /// is touched.
    pub async fn create_from_bytes(&self, name: &str, bytes: &[u8]) -> Result<DocumentRecord> {
        if name.trim().is_empty() {
            return Err(Error::validation("document name must not be empty"));
        }

        let id = generate_doc_id();
        let path = self.blobs.path_for(&id, name);
        let size = self.blobs.write(&path, bytes).await?;
        let record = DocumentRecord::new(id, name, size, path);

        {
            let mut table = self.table.write();
            table.records.insert(record.id.clone(), record.clone());
            table.touch();
        }
        self.notifier.notify();
        Metrics::global().documents_created.inc();

        info!(id = %record.id, name = %record.name, size, "document created");
        Ok(record)
    }

    /// Copy of a record by id
    pub fn get(&self, id: &str) -> Result<DocumentRecord> {
        self.table
            .read()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(id))
    }

    /// Unordered copies of all live records
    pub fn list(&self) -> Vec<DocumentRecord> {
        self.table.read().records.values().cloned().collect()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.table.read().records.len()
    }

    /// Whether the registry holds no records
    pub fn is_empty(&self) -> bool {
        self.table.read().records.is_empty()
    }

    /// Increment a document's click counter, returning the updated
    /// record. Unknown ids fail without touching dirty or the cache.
    pub fn click(&self, id: &str) -> Result<DocumentRecord> {
        let record = {
            let mut table = self.table.write();
            let Some(record) = table.records.get_mut(id) else {
                return Err(Error::not_found(id));
            };
            record.clicks += 1;
            let snapshot = record.clone();
            table.touch();
            snapshot
        };
        self.notifier.notify();
        Metrics::global().clicks_total.inc();

        debug!(id = %record.id, clicks = record.clicks, "click recorded");
        Ok(record)
    }

    /// Rename a document. Clicks, content, and timestamps are untouched.
    pub fn rename(&self, id: &str, new_name: &str) -> Result<DocumentRecord> {
        if new_name.trim().is_empty() {
            return Err(Error::validation("document name must not be empty"));
        }

        let record = {
            let mut table = self.table.write();
            let Some(record) = table.records.get_mut(id) else {
                return Err(Error::not_found(id));
            };
            record.name = new_name.to_string();
            let snapshot = record.clone();
            table.touch();
            snapshot
        };
        self.notifier.notify();

        info!(id = %record.id, name = %record.name, "document renamed");
        Ok(record)
    }

    /// Replace a document's content in place, refreshing size and
    /// timestamp while preserving name and clicks.
    ///
    /// Not atomic with respect to content visibility: the old blob is
    /// removed before the new one is written. If the write fails the
    /// record is left referencing missing content and the error is
    /// surfaced; the caller must repair or delete the document.
    pub async fn replace_content(&self, id: &str, content: &str) -> Result<DocumentRecord> {
        let path = self
            .table
            .read()
            .records
            .get(id)
            .map(|r| r.content_ref.clone())
            .ok_or_else(|| Error::not_found(id))?;

        self.blobs.remove(&path).await?;
        let size = self.blobs.write(&path, content.as_bytes()).await?;

        let record = {
            let mut table = self.table.write();
            // The record can only have been deleted since the lookup
            let Some(record) = table.records.get_mut(id) else {
                return Err(Error::not_found(id));
            };
            record.size = size;
            record.uploaded_at = chrono::Utc::now();
            let snapshot = record.clone();
            table.touch();
            snapshot
        };
        self.notifier.notify();

        info!(id = %record.id, size, "document content replaced");
        Ok(record)
    }

    /// Delete a document and its blob. A blob that is already missing
    /// counts as removed; any other blob I/O failure aborts the delete
    /// and the record remains. Deletion is terminal for the id.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let path = self
            .table
            .read()
            .records
            .get(id)
            .map(|r| r.content_ref.clone())
            .ok_or_else(|| Error::not_found(id))?;

        self.blobs.remove(&path).await?;

        {
            let mut table = self.table.write();
            if table.records.remove(id).is_none() {
                return Err(Error::not_found(id));
            }
            table.touch();
        }
        self.notifier.notify();
        Metrics::global().documents_deleted.inc();

        info!(id, "document deleted");
        Ok(())
    }

    /// Read a document's content as text, truncated at 100 KiB
    pub async fn read_content(&self, id: &str) -> Result<String> {
        let path = self
            .table
            .read()
            .records
            .get(id)
            .map(|r| r.content_ref.clone())
            .ok_or_else(|| Error::not_found(id))?;

        let bytes = self.blobs.read(&path).await?;
        if bytes.len() > MAX_CONTENT_READ {
            Ok(format!(
                "{}\n... (content truncated)",
                String::from_utf8_lossy(&bytes[..MAX_CONTENT_READ])
            ))
        } else {
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }

    /// Read a document's raw content along with its record, for the
    /// download path
    pub async fn read_raw(&self, id: &str) -> Result<(DocumentRecord, Vec<u8>)> {
        let record = self.get(id)?;
        let bytes = self.blobs.read(&record.content_ref).await?;
        Ok((record, bytes))
    }

    /// Fresh copy of the ranking (clicks descending, ascending-id
    /// tie-break), rebuilding the cache first if it is stale
    pub fn ranking(&self) -> Vec<DocumentRecord> {
        let table = self.table.upgradable_read();
        if table.ranking.is_valid() {
            return table.ranking.snapshot();
        }
        let mut table = RwLockUpgradableReadGuard::upgrade(table);
        table.rebuild_ranking();
        table.ranking.snapshot()
    }

    /// Whether the ranking cache is stale, for the update poller
    pub fn ranking_invalid(&self) -> bool {
        !self.table.read().ranking.is_valid()
    }

    /// Whether in-memory state has diverged from the last snapshot
    pub fn is_dirty(&self) -> bool {
        self.table.read().dirty
    }

    /// Restore the dirty flag after a failed save
    pub fn mark_dirty(&self) {
        self.table.write().dirty = true;
    }

    /// Clear the dirty flag and collect all records, sorted by id for a
    /// reproducible snapshot file.
    ///
    /// The flag is cleared before the write happens so a mutation racing
    /// the save re-dirties the table rather than being lost; the caller
    /// must call [`mark_dirty`](Self::mark_dirty) if the write fails.
    pub fn begin_flush(&self) -> Vec<DocumentRecord> {
        let mut table = self.table.write();
        table.dirty = false;
        let mut records: Vec<DocumentRecord> = table.records.values().cloned().collect();
        records.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn registry() -> (DocumentRegistry, ChangeListeners, TempDir) {
        let dir = tempdir().unwrap();
        let (registry, listeners) = DocumentRegistry::new(BlobStore::new(dir.path()));
        (registry, listeners, dir)
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_id_and_zero_clicks() {
        let (registry, _listeners, _dir) = registry();

        let a = registry.create("a.txt", "alpha").await.unwrap();
        let b = registry.create("b.txt", "beta").await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.clicks, 0);
        assert_eq!(a.size, 5);
        assert!(registry.blobs().read(&a.content_ref).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_empty_name() {
        let (registry, _listeners, _dir) = registry();

        let err = registry.create("   ", "content").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(registry.is_empty());
        assert!(!registry.is_dirty());
    }

    #[tokio::test]
    async fn test_clicks_accumulate_per_document() {
        let (registry, _listeners, _dir) = registry();
        let a = registry.create("a", "x").await.unwrap();
        let b = registry.create("b", "y").await.unwrap();

        for _ in 0..3 {
            registry.click(&a.id).unwrap();
            registry.click(&b.id).unwrap();
        }
        registry.click(&a.id).unwrap();

        assert_eq!(registry.get(&a.id).unwrap().clicks, 4);
        assert_eq!(registry.get(&b.id).unwrap().clicks, 3);
    }

    #[tokio::test]
    async fn test_click_unknown_id_has_no_side_effects() {
        let (registry, _listeners, _dir) = registry();
        registry.create("a", "x").await.unwrap();

        // Settle both flags, then verify the failed click moves neither.
        let _ = registry.begin_flush();
        let _ = registry.ranking();

        let err = registry.click("doc_missing").unwrap_err();
        assert!(err.is_not_found());
        assert!(!registry.is_dirty());
        assert!(!registry.ranking_invalid());
    }

    #[tokio::test]
    async fn test_ranking_scenario_three_clicks() {
        let (registry, _listeners, _dir) = registry();
        let a = registry.create("A", "").await.unwrap();
        let b = registry.create("B", "").await.unwrap();

        for _ in 0..3 {
            registry.click(&a.id).unwrap();
        }

        let ranking = registry.ranking();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].id, a.id);
        assert_eq!(ranking[0].clicks, 3);
        assert_eq!(ranking[1].id, b.id);
        assert_eq!(ranking[1].clicks, 0);
    }

    #[tokio::test]
    async fn test_ranking_read_is_idempotent() {
        let (registry, _listeners, _dir) = registry();
        for name in ["a", "b", "c"] {
            let r = registry.create(name, "").await.unwrap();
            registry.click(&r.id).unwrap();
        }

        assert_eq!(registry.ranking(), registry.ranking());
        assert!(!registry.ranking_invalid());
    }

    #[tokio::test]
    async fn test_rename_preserves_clicks_and_timestamp() {
        let (registry, _listeners, _dir) = registry();
        let doc = registry.create("old", "content").await.unwrap();
        registry.click(&doc.id).unwrap();

        let renamed = registry.rename(&doc.id, "new").unwrap();
        assert_eq!(renamed.name, "new");
        assert_eq!(renamed.clicks, 1);
        assert_eq!(renamed.uploaded_at, doc.uploaded_at);
        assert_eq!(renamed.content_ref, doc.content_ref);

        let err = registry.rename(&doc.id, "").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_replace_content_refreshes_size_and_time() {
        let (registry, _listeners, _dir) = registry();
        let doc = registry.create("doc", "short").await.unwrap();
        registry.click(&doc.id).unwrap();

        let updated = registry
            .replace_content(&doc.id, "considerably longer content")
            .await
            .unwrap();

        assert_eq!(updated.clicks, 1);
        assert_eq!(updated.name, doc.name);
        assert_eq!(updated.content_ref, doc.content_ref);
        assert_eq!(updated.size, 27);
        assert!(updated.uploaded_at >= doc.uploaded_at);
        assert_eq!(
            registry.read_content(&doc.id).await.unwrap(),
            "considerably longer content"
        );
    }

    #[tokio::test]
    async fn test_delete_is_terminal() {
        let (registry, _listeners, _dir) = registry();
        let doc = registry.create("doc", "content").await.unwrap();

        registry.delete(&doc.id).await.unwrap();
        assert!(registry.get(&doc.id).unwrap_err().is_not_found());
        assert!(registry.delete(&doc.id).await.unwrap_err().is_not_found());
        assert!(registry
            .blobs()
            .read(&doc.content_ref)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_blob() {
        let (registry, _listeners, _dir) = registry();
        let doc = registry.create("doc", "content").await.unwrap();

        tokio::fs::remove_file(&doc.content_ref).await.unwrap();
        registry.delete(&doc.id).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_live_count_tracks_creates_minus_deletes() {
        let (registry, _listeners, _dir) = registry();

        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(registry.create(&format!("doc-{i}"), "").await.unwrap().id);
        }
        registry.delete(&ids[0]).await.unwrap();
        registry.delete(&ids[3]).await.unwrap();
        assert!(registry.delete("doc_never_existed").await.is_err());

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.list().len(), 3);
    }

    #[tokio::test]
    async fn test_read_content_truncates_large_blobs() {
        let (registry, _listeners, _dir) = registry();
        let big = "x".repeat(150 * 1024);
        let doc = registry.create("big", &big).await.unwrap();

        let content = registry.read_content(&doc.id).await.unwrap();
        assert!(content.len() < big.len());
        assert!(content.ends_with("... (content truncated)"));
    }

    #[tokio::test]
    async fn test_mutations_fire_change_signals() {
        let (registry, listeners, _dir) = registry();

        registry.create("doc", "x").await.unwrap();
        assert!(listeners.save_rx.try_recv().is_ok());
        assert!(listeners.update_rx.try_recv().is_ok());

        // Repeated mutations coalesce in the capacity-1 save mailbox.
        let doc = registry.create("doc2", "x").await.unwrap();
        registry.click(&doc.id).unwrap();
        registry.click(&doc.id).unwrap();
        assert!(listeners.save_rx.try_recv().is_ok());
        assert!(listeners.save_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_begin_flush_clears_dirty_and_sorts() {
        let (registry, _listeners, _dir) = registry();
        registry.create("b", "").await.unwrap();
        registry.create("a", "").await.unwrap();
        assert!(registry.is_dirty());

        let records = registry.begin_flush();
        assert_eq!(records.len(), 2);
        assert!(records[0].id < records[1].id);
        assert!(!registry.is_dirty());

        registry.mark_dirty();
        assert!(registry.is_dirty());
    }
}
