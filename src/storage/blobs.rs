//! Content blob storage
//!
//! The registry treats document content as opaque blobs addressed by the
//! `content_ref` stored in each record. This module owns the upload
//! directory and the write/read/remove mechanics; it knows nothing about
//! records or rankings.

use crate::types::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Blob store rooted at the upload directory
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Create a blob store rooted at `root`. The directory is created by
    /// the caller during bootstrap.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Upload directory this store writes into
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Derive the blob path for a document: `<root>/<id>_<sanitized name>`
    pub fn path_for(&self, id: &str, name: &str) -> PathBuf {
        self.root.join(format!("{}_{}", id, sanitize_filename(name)))
    }

    /// Write `bytes` to `path`, returning the stored size.
    ///
    /// A failed write leaves no partial blob behind; the half-written
    /// file is removed best-effort before the error is surfaced.
    pub async fn write(&self, path: &Path, bytes: &[u8]) -> Result<u64> {
        if let Err(e) = fs::write(path, bytes).await {
            if fs::remove_file(path).await.is_err() {
                warn!(path = %path.display(), "could not clean up partial blob");
            }
            return Err(e.into());
        }
        Ok(bytes.len() as u64)
    }

    /// Read the full blob at `path`
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the blob at `path`. A blob that is already gone counts as
    /// success; any other I/O failure is surfaced.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Make a user-supplied name safe to embed in a blob filename.
///
/// Replaces characters that are invalid on common filesystems with `_`
/// and trims surrounding whitespace. Only the blob path is sanitized;
/// the record keeps the name as given.
pub fn sanitize_filename(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' | '/' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_filename("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_filename("  report?.txt  "), "report_.txt");
        assert_eq!(sanitize_filename("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_path_for_embeds_id_and_safe_name() {
        let store = BlobStore::new("uploads");
        assert_eq!(store.root(), Path::new("uploads"));

        let path = store.path_for("doc_1", "a/b.txt");
        assert_eq!(path, PathBuf::from("uploads/doc_1_a_b.txt"));
    }

    #[tokio::test]
    async fn test_write_read_remove_round_trip() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let path = store.path_for("doc_1", "note.txt");

        let size = store.write(&path, b"hello").await.unwrap();
        assert_eq!(size, 5);
        assert_eq!(store.read(&path).await.unwrap(), b"hello");

        store.remove(&path).await.unwrap();
        assert!(store.read(&path).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_remove_tolerates_missing_blob() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let path = store.path_for("doc_1", "gone.txt");

        store.remove(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_blob_is_not_found() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());

        let err = store.read(&store.path_for("doc_1", "x")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
