//! Route definitions for the HTTP API

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::HttpConfig;
use crate::AppState;

use super::api;

/// Create the main router with all routes
pub fn create_router(app_state: Arc<AppState>, config: &HttpConfig) -> Router {
    let cors = if config.cors_enabled {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    // BVH files, the fallback character and the generated mesh
    let public = ServeDir::new(app_state.store.public_dir());

    Router::new()
        // API endpoints (JSON)
        .route("/api/status", get(api::get_status))
        .route("/api/scene", get(api::get_scene))
        .route("/api/prompt", post(api::send_prompt))
        .route("/api/measurements", post(api::commit_measurements))
        .route("/api/upload", post(api::upload))
        // SSE stream of scene changes
        .route("/api/stream", get(api::scene_stream))
        // Static files
        .fallback_service(public)
        // Middleware
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
