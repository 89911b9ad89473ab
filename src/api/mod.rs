//! HTTP and WebSocket surface of the docrank service

/// Request handlers and the response envelope
pub mod handlers;

/// Observer registry and ranking fan-out
pub mod hub;

/// Router construction and the server loop
pub mod server;

/// WebSocket observer endpoint
pub mod ws;

pub use hub::BroadcastHub;
pub use server::{create_app, start_server};
