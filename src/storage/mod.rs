//! Storage and persistence layer
//!
//! The registry owns the in-memory document table, the ranking cache is
//! its derived ordering, the persistence manager snapshots it to disk,
//! and the blob store holds the physical content.

pub mod blobs;
pub mod persistence;
pub mod ranking;
pub mod registry;

// Re-export main storage types
pub use blobs::BlobStore;
pub use persistence::PersistenceManager;
pub use ranking::RankingCache;
pub use registry::{ChangeListeners, DocumentRegistry};
