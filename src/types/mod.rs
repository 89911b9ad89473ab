//! Core type definitions for the docrank service
//!
//! This module contains the document record tracked by the registry and
//! the crate-wide error types.

pub mod document;
pub mod error;

// Re-export commonly used types for convenience
pub use document::{generate_doc_id, DocumentRecord};
pub use error::{Error, Result};
