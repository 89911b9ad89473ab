//! # Docrank
//!
//! Real-time document click-ranking service. Documents live in an
//! in-memory registry backed by on-disk content blobs and a periodic
//! JSON snapshot; click activity feeds a lazily rebuilt ranking that
//! is pushed to WebSocket observers.

#![warn(missing_docs)]

/// HTTP API handlers, routing and the observer hub
pub mod api;

/// Configuration, shared state and the update poller
pub mod core;

/// Registry, ranking cache, blob store and snapshot persistence
pub mod storage;

/// System utilities and metrics
pub mod system;

/// Type definitions for all data structures
pub mod types;

// Re-export commonly used items
pub use crate::core::Config;
pub use crate::types::{DocumentRecord, Error, Result};

/// Crate version from the build manifest
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name used in logs
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// jemalloc for the long-running allocation-heavy server process
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Install the tracing subscriber and warm up global services.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Register all counters up front so /api/metrics is complete from
    // the first scrape.
    let _ = system::metrics::Metrics::global();
}
