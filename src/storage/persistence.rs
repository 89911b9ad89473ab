//! Durable registry snapshots
//!
//! The persistence manager serializes the full registry to a single JSON
//! file. Writes are atomic: the snapshot is written to a temp file in
//! the same directory and renamed over the destination, so a crash never
//! leaves a corrupt or half-written file behind.
//!
//! Flushing is driven by two independent mechanisms: the registry's
//! debounced save trigger (at most one outstanding request; extra
//! triggers are coalesced) and an unconditional periodic timer. Both
//! check the dirty flag before doing work. A failed save is logged,
//! leaves the registry dirty, and is retried on the next wake-up.

use crate::storage::registry::DocumentRegistry;
use crate::system::metrics::Metrics;
use crate::types::{DocumentRecord, Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::watch;
use tracing::{error, info};

/// Background snapshot writer for a [`DocumentRegistry`]
pub struct PersistenceManager {
    registry: Arc<DocumentRegistry>,
    snapshot_path: PathBuf,
    save_rx: flume::Receiver<()>,
    flush_interval: Duration,
    save_seq: AtomicU64,
}

impl PersistenceManager {
    /// Create a manager flushing `registry` to `snapshot_path`
    pub fn new(
        registry: Arc<DocumentRegistry>,
        snapshot_path: impl Into<PathBuf>,
        save_rx: flume::Receiver<()>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            registry,
            snapshot_path: snapshot_path.into(),
            save_rx,
            flush_interval,
            save_seq: AtomicU64::new(0),
        }
    }

    /// Load records from a snapshot file.
    ///
    /// A missing file is not an error: the registry starts empty. Any
    /// other read failure, or a file that does not parse, is fatal to
    /// startup.
    pub async fn load(path: &Path) -> Result<Vec<DocumentRecord>> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::SnapshotCorrupt(format!("{}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no existing snapshot, starting empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Serialize the full registry and atomically replace the snapshot.
    ///
    /// The dirty flag is cleared as the records are collected; a
    /// mutation racing the write re-dirties the registry instead of
    /// being lost. On failure the flag is restored and the error
    /// surfaced.
    pub async fn save(&self) -> Result<()> {
        let records = self.registry.begin_flush();
        match self.write_snapshot(&records).await {
            Ok(()) => {
                Metrics::global().snapshot_saves.inc();
                Ok(())
            }
            Err(e) => {
                self.registry.mark_dirty();
                Metrics::global().snapshot_save_failures.inc();
                Err(e)
            }
        }
    }

    async fn write_snapshot(&self, records: &[DocumentRecord]) -> Result<()> {
        let data = serde_json::to_vec_pretty(records)?;

        // Temp file in the same directory so the rename stays on one
        // filesystem and is atomic. The sequence suffix keeps two
        // in-flight saves (flush loop racing close) from writing the
        // same temp file.
        let seq = self.save_seq.fetch_add(1, Ordering::Relaxed);
        let mut tmp = self.snapshot_path.as_os_str().to_owned();
        tmp.push(format!(".tmp.{seq}"));
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &self.snapshot_path).await?;
        Ok(())
    }

    /// Periodic flush loop. Runs until shutdown is signaled or the save
    /// trigger disconnects; saves only when the registry is dirty.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                triggered = self.save_rx.recv_async() => {
                    if triggered.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            if !self.registry.is_dirty() {
                continue;
            }
            if let Err(e) = self.save().await {
                error!(path = %self.snapshot_path.display(), "snapshot save failed, will retry: {e}");
            }
        }
    }

    /// One final unconditional save, regardless of the dirty flag.
    /// Called after the flush loop has been signaled to stop.
    pub async fn close(&self) -> Result<()> {
        self.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::blobs::BlobStore;
    use tempfile::tempdir;

    fn manager(
        registry: Arc<DocumentRegistry>,
        path: impl Into<PathBuf>,
        save_rx: flume::Receiver<()>,
    ) -> PersistenceManager {
        PersistenceManager::new(registry, path, save_rx, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let (registry, listeners) = DocumentRegistry::new(BlobStore::new(dir.path()));
        let registry = Arc::new(registry);

        let a = registry.create("a", "alpha").await.unwrap();
        let b = registry.create("b", "beta").await.unwrap();
        registry.click(&a.id).unwrap();

        let snapshot = dir.path().join("documents.json");
        let persistence = manager(registry.clone(), &snapshot, listeners.save_rx);
        persistence.save().await.unwrap();
        assert!(!registry.is_dirty());

        let mut loaded = PersistenceManager::load(&snapshot).await.unwrap();
        loaded.sort_unstable_by(|x, y| x.id.cmp(&y.id));
        let mut expected = vec![registry.get(&a.id).unwrap(), registry.get(&b.id).unwrap()];
        expected.sort_unstable_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(loaded, expected);
    }

    #[tokio::test]
    async fn test_load_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let records = PersistenceManager::load(&dir.path().join("nope.json"))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("documents.json");
        fs::write(&path, b"{ not json").await.unwrap();

        let err = PersistenceManager::load(&path).await.unwrap_err();
        assert!(matches!(err, Error::SnapshotCorrupt(_)));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_registry_dirty_and_queryable() {
        let dir = tempdir().unwrap();
        let (registry, listeners) = DocumentRegistry::new(BlobStore::new(dir.path()));
        let registry = Arc::new(registry);
        let doc = registry.create("doc", "content").await.unwrap();

        // Destination directory does not exist, so the temp write fails.
        let bad_path = dir.path().join("missing-dir").join("documents.json");
        let persistence = manager(registry.clone(), &bad_path, listeners.save_rx);

        assert!(persistence.save().await.is_err());
        assert!(registry.is_dirty());
        assert_eq!(registry.get(&doc.id).unwrap().name, "doc");
    }

    #[tokio::test]
    async fn test_save_atomically_replaces_existing_snapshot() {
        let dir = tempdir().unwrap();
        let (registry, listeners) = DocumentRegistry::new(BlobStore::new(dir.path()));
        let registry = Arc::new(registry);
        let snapshot = dir.path().join("documents.json");
        let persistence = manager(registry.clone(), &snapshot, listeners.save_rx);

        registry.create("first", "").await.unwrap();
        persistence.save().await.unwrap();
        registry.create("second", "").await.unwrap();
        persistence.save().await.unwrap();

        let records = PersistenceManager::load(&snapshot).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(temp_files(dir.path()), 0);
    }

    fn temp_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .contains(".tmp")
            })
            .count()
    }

    #[tokio::test]
    async fn test_concurrent_saves_use_distinct_temp_files() {
        let dir = tempdir().unwrap();
        let (registry, listeners) = DocumentRegistry::new(BlobStore::new(dir.path()));
        let registry = Arc::new(registry);
        let snapshot = dir.path().join("documents.json");
        let persistence = manager(registry.clone(), &snapshot, listeners.save_rx);

        registry.create("doc", "content").await.unwrap();

        // A flush-loop save racing close() must not share a temp file.
        let (a, b) = tokio::join!(persistence.save(), persistence.save());
        a.unwrap();
        b.unwrap();

        let records = PersistenceManager::load(&snapshot).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_flush_loop_saves_on_trigger() {
        let dir = tempdir().unwrap();
        let (registry, listeners) = DocumentRegistry::new(BlobStore::new(dir.path()));
        let registry = Arc::new(registry);
        let snapshot = dir.path().join("documents.json");

        let persistence = Arc::new(PersistenceManager::new(
            registry.clone(),
            &snapshot,
            listeners.save_rx,
            Duration::from_secs(60),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(persistence.clone().run(shutdown_rx));

        // The create fires the debounced save trigger.
        registry.create("doc", "content").await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !snapshot.exists() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(snapshot.exists());
        assert!(!registry.is_dirty());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_saves_even_when_clean() {
        let dir = tempdir().unwrap();
        let (registry, listeners) = DocumentRegistry::new(BlobStore::new(dir.path()));
        let registry = Arc::new(registry);
        let snapshot = dir.path().join("documents.json");
        let persistence = manager(registry, &snapshot, listeners.save_rx);

        // Nothing is dirty, close still writes the (empty) snapshot.
        persistence.close().await.unwrap();
        let records = PersistenceManager::load(&snapshot).await.unwrap();
        assert!(records.is_empty());
    }
}
