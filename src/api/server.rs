//! HTTP server for the docrank API

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use super::{handlers, ws};
use crate::core::AppState;
use crate::types::Result;

/// Creates the main application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, ACCESS_CONTROL_ALLOW_ORIGIN])
        .allow_origin(Any)
        .allow_credentials(false);

    // Body limit leaves headroom above the upload cap so the size check
    // in the handler produces the error, not the transport layer.
    let body_limit = state.config.server.max_upload_bytes + 2 * 1024 * 1024;

    Router::new()
        // Document routes
        .route("/api/files", get(handlers::list_documents))
        .route("/api/files/create", post(handlers::create_document))
        .route("/api/files/upload", post(handlers::upload_document))
        .route("/api/files/click", post(handlers::bulk_click))
        .route("/api/files/{id}", get(handlers::get_document))
        .route("/api/files/{id}", delete(handlers::delete_document))
        .route("/api/files/{id}/click", post(handlers::click_document))
        .route("/api/files/{id}/rename", put(handlers::rename_document))
        .route("/api/files/{id}/content", get(handlers::get_content))
        .route(
            "/api/files/{id}/content/edit",
            put(handlers::update_content),
        )
        .route("/api/files/{id}/download", get(handlers::download_document))
        // Ranking routes
        .route("/api/ranking", get(handlers::get_ranking))
        .route("/api/ws", get(ws::websocket_handler))
        // System routes
        .route("/api/health", get(handlers::health_check))
        .route("/api/metrics", get(handlers::metrics_endpoint))
        // Apply middleware to ALL routes
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind the listen address and serve until the shutdown flag flips
pub async fn start_server(state: AppState, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let addr: SocketAddr = state.config.server.http_addr;

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("server listening on http://{}", addr);
    info!("health check available at http://{}/api/health", addr);
    info!("ranking feed available at ws://{}/api/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    Ok(())
}
