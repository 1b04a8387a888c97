//! HTTP server setup and routing

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Error, Result};
use crate::playback::TeamSyncEngine;
use crate::sync::ConnectionHub;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<TeamSyncEngine>,
    /// Live realtime connections (WebSocket and SSE)
    pub hub: Arc<ConnectionHub>,
    pub sse_keep_alive: Duration,
}

/// Build the router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        // Realtime channels
        .route("/ws", get(super::ws::ws_handler))
        .route("/teams/:team_id/events", get(super::sse::team_events))
        // Team state
        .route(
            "/teams/:team_id",
            axum::routing::delete(super::handlers::delete_team),
        )
        .route("/teams/:team_id/state", get(super::handlers::get_state))
        .route("/teams/:team_id/queue", get(super::handlers::get_queue))
        // Playback control
        .route("/teams/:team_id/play", post(super::handlers::play))
        .route("/teams/:team_id/pause", post(super::handlers::pause))
        .route("/teams/:team_id/next", post(super::handlers::next))
        .route("/teams/:team_id/previous", post(super::handlers::previous))
        .route("/teams/:team_id/jump", post(super::handlers::jump))
        .route("/teams/:team_id/refresh", post(super::handlers::refresh))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` resolves
pub async fn run(
    addr: SocketAddr,
    ctx: AppContext,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(ctx);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
