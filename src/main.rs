//! Docrank server binary
//!
//! Wires the registry, persistence, poller and hub together and serves
//! the HTTP/WebSocket API until SIGINT or SIGTERM.

use clap::{Arg, Command};
use docrank::api::{self, BroadcastHub};
use docrank::core::{poller, AppState};
use docrank::storage::{BlobStore, DocumentRegistry, PersistenceManager};
use docrank::Config;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let matches = Command::new("docrank")
        .version(docrank::VERSION)
        .about("Live document click-ranking service")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("http-addr")
                .long("http-addr")
                .value_name("ADDR")
                .help("HTTP listen address, e.g. 0.0.0.0:8080"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory for the registry snapshot"),
        )
        .arg(
            Arg::new("upload-dir")
                .long("upload-dir")
                .value_name("DIR")
                .help("Directory for document content blobs"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .get_matches();

    // Load configuration, then layer CLI flags on top
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };
    if let Some(addr) = matches.get_one::<String>("http-addr") {
        config.server.http_addr = addr.parse()?;
    }
    if let Some(dir) = matches.get_one::<String>("data-dir") {
        config.storage.data_dir = dir.into();
    }
    if let Some(dir) = matches.get_one::<String>("upload-dir") {
        config.storage.upload_dir = dir.into();
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }

    docrank::init(&config.logging.level);
    info!("starting {} {}", docrank::NAME, docrank::VERSION);

    tokio::fs::create_dir_all(&config.storage.data_dir).await?;
    tokio::fs::create_dir_all(&config.storage.upload_dir).await?;

    // Rebuild the registry from the snapshot. A corrupt snapshot is
    // fatal here; a missing one just means an empty registry.
    let snapshot_path = config.snapshot_path();
    let records = PersistenceManager::load(&snapshot_path).await?;
    info!("loaded {} document(s) from snapshot", records.len());

    let blobs = BlobStore::new(&config.storage.upload_dir);
    let (registry, listeners) = DocumentRegistry::with_records(blobs, records);
    let registry = Arc::new(registry);

    let hub = Arc::new(BroadcastHub::new(config.realtime.broadcast_buffer));
    let persistence = Arc::new(PersistenceManager::new(
        Arc::clone(&registry),
        snapshot_path,
        listeners.save_rx,
        config.flush_interval(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let hub_task = tokio::spawn(Arc::clone(&hub).run(shutdown_rx.clone()));
    let poller_task = tokio::spawn(poller::run(
        Arc::clone(&registry),
        Arc::clone(&hub),
        listeners.update_rx,
        config.poll_interval(),
        shutdown_rx.clone(),
    ));
    let persistence_task = tokio::spawn(Arc::clone(&persistence).run(shutdown_rx.clone()));

    let config = Arc::new(config);
    let state = AppState::new(Arc::clone(&registry), Arc::clone(&hub), Arc::clone(&config));

    let server = api::start_server(state, shutdown_rx);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("server terminated: {}", e);
            }
        }
        _ = shutdown_signal() => {
            warn!("received shutdown signal");
        }
    }

    // Stop accepting observers, stop the background tasks, take a
    // final snapshot so no acknowledged mutation is lost, then release
    // the observer connections.
    hub.close_registrations();
    let _ = shutdown_tx.send(true);

    if let Err(e) = persistence.close().await {
        error!("final snapshot failed: {}", e);
    }
    hub.shutdown();

    let _ = hub_task.await;
    let _ = poller_task.await;
    let _ = persistence_task.await;

    info!("shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or, on unix, SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
