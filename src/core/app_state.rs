//! Shared application state
//!
//! One `AppState` is built at startup and cloned into the router and
//! background tasks. Cloning only bumps reference counts.

use crate::api::hub::BroadcastHub;
use crate::core::config::Config;
use crate::storage::DocumentRegistry;
use std::sync::Arc;

/// Central application state holding all shared services
#[derive(Clone)]
pub struct AppState {
    /// The document registry
    pub registry: Arc<DocumentRegistry>,

    /// The observer broadcast hub
    pub hub: Arc<BroadcastHub>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Assemble the application state from its services
    pub fn new(registry: Arc<DocumentRegistry>, hub: Arc<BroadcastHub>, config: Arc<Config>) -> Self {
        Self {
            registry,
            hub,
            config,
        }
    }
}
