//! Route configuration.

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use chunkup_protocol::{MERGE_PATH, UPLOAD_PATH, VERIFY_PATH};
use chunkup_store::ChunkStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handlers;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ChunkStore>,
    pub body_limit: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            store: Arc::new(ChunkStore::new(config.store_config())),
            body_limit: config.body_limit(),
        }
    }
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(VERIFY_PATH, post(handlers::verify))
        .route(UPLOAD_PATH, post(handlers::upload_chunk))
        .route(MERGE_PATH, post(handlers::merge))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
