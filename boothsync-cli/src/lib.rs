//! HTTP API served by the boothsync daemon.

use axum::{extract::State, response::Json, routing::get, routing::post, Router};
use boothsync_sync::{SyncResult, SyncService, SyncStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of `GET /api/v1/connection`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionResponse {
    pub connected: bool,
}

async fn status_handler(State(service): State<Arc<SyncService>>) -> Json<SyncStatus> {
    Json(service.get_sync_status())
}

async fn sync_handler(State(service): State<Arc<SyncService>>) -> Json<SyncResult> {
    Json(service.sync().await)
}

async fn connection_handler(State(service): State<Arc<SyncService>>) -> Json<ConnectionResponse> {
    Json(ConnectionResponse {
        connected: service.test_connection().await,
    })
}

/// Build the HTTP API router around a running service.
pub fn build_router(service: Arc<SyncService>) -> Router {
    Router::new()
        .route("/api/v1/status", get(status_handler))
        .route("/api/v1/connection", get(connection_handler))
        .route("/api/v1/sync", post(sync_handler))
        .with_state(service)
}
