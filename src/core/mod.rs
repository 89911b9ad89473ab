//! Core system foundations: configuration, shared state, and the
//! update poller

pub mod app_state;
pub mod config;
pub mod poller;

// Re-export commonly used items
pub use app_state::AppState;
pub use config::Config;
