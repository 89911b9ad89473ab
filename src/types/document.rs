//! Document record types
//!
//! A [`DocumentRecord`] is the unit entity tracked by the registry: one
//! entry per stored document, carrying its click counter and a reference
//! to the physical content blob. Records are plain values; the registry
//! hands out copies, never shared references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// One entry per stored document.
///
/// The serde field names define both the persisted snapshot format and
/// the JSON shape pushed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Opaque unique identifier, assigned at creation, never reused
    pub id: String,

    /// Display name; arbitrary user text, sanitized only when deriving
    /// a storage path
    pub name: String,

    /// Click counter; monotonically non-decreasing over the record's
    /// lifetime
    pub clicks: u64,

    /// Byte length of the content blob, recomputed on content writes
    pub size: u64,

    /// Set at creation, refreshed when content is replaced; untouched
    /// by rename and click
    pub uploaded_at: DateTime<Utc>,

    /// Path of the physical content blob; stable for the record's
    /// lifetime, rewritten in place across content replacement
    pub content_ref: PathBuf,
}

impl DocumentRecord {
    /// Create a fresh record with zero clicks and the current time
    pub fn new(id: String, name: impl Into<String>, size: u64, content_ref: PathBuf) -> Self {
        Self {
            id,
            name: name.into(),
            clicks: 0,
            size,
            uploaded_at: Utc::now(),
            content_ref,
        }
    }
}

/// Generate a fresh document id.
///
/// Ids are opaque to callers; the `doc_` prefix keeps them greppable in
/// logs and snapshots.
pub fn generate_doc_id() -> String {
    format!("doc_{}", Uuid::new_v4().simple())
}
