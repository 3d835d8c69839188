//! Route modules for the SSE-C gateway

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod download;
pub mod health;
pub mod upload;

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let upload_limit = match state.config().transfer.max_upload_bytes {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router())
        .merge(upload::router().layer(upload_limit))
        .merge(download::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
