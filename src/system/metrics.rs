//! Metrics collection and monitoring
//!
//! Prometheus counters for the registry, persistence, and fan-out
//! paths, registered once against the default registry and exported as
//! text at `/api/metrics`.

use crate::types::Result;
use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_gauge, IntCounter, IntGauge, TextEncoder,
};

/// Centralized metrics for all service components
pub struct Metrics {
    /// Total documents created (uploads and text creates)
    pub documents_created: IntCounter,
    /// Total documents deleted
    pub documents_deleted: IntCounter,
    /// Total click increments applied
    pub clicks_total: IntCounter,
    /// Total ranking cache rebuilds
    pub ranking_rebuilds: IntCounter,
    /// Total successful snapshot saves
    pub snapshot_saves: IntCounter,
    /// Total failed snapshot saves
    pub snapshot_save_failures: IntCounter,
    /// Total ranking payloads fanned out to observers
    pub broadcasts_sent: IntCounter,
    /// Total ranking payloads dropped by a full distribution buffer
    pub broadcasts_dropped: IntCounter,
    /// Currently connected observers
    pub observers_connected: IntGauge,
}

impl Metrics {
    fn new() -> Result<Self> {
        Ok(Self {
            documents_created: register_int_counter!(
                "docrank_documents_created_total",
                "Total number of documents created"
            )?,
            documents_deleted: register_int_counter!(
                "docrank_documents_deleted_total",
                "Total number of documents deleted"
            )?,
            clicks_total: register_int_counter!(
                "docrank_clicks_total",
                "Total number of click increments applied"
            )?,
            ranking_rebuilds: register_int_counter!(
                "docrank_ranking_rebuilds_total",
                "Total number of ranking cache rebuilds"
            )?,
            snapshot_saves: register_int_counter!(
                "docrank_snapshot_saves_total",
                "Total number of successful snapshot saves"
            )?,
            snapshot_save_failures: register_int_counter!(
                "docrank_snapshot_save_failures_total",
                "Total number of failed snapshot saves"
            )?,
            broadcasts_sent: register_int_counter!(
                "docrank_broadcasts_sent_total",
                "Total number of ranking payloads fanned out"
            )?,
            broadcasts_dropped: register_int_counter!(
                "docrank_broadcasts_dropped_total",
                "Total number of ranking payloads dropped"
            )?,
            observers_connected: register_int_gauge!(
                "docrank_observers_connected",
                "Number of currently connected observers"
            )?,
        })
    }

    /// Get the global metrics instance
    pub fn global() -> &'static Metrics {
        static INSTANCE: Lazy<Metrics> = Lazy::new(|| {
            Metrics::new().expect("Failed to initialize metrics")
        });
        &INSTANCE
    }
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&prometheus::gather())?)
}
