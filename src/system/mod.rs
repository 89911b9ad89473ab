//! System-level services: metrics and monitoring

pub mod metrics;
