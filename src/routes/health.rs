//! Liveness endpoint
//!
//! Reports the build and which bucket and backend transfers go to. It never
//! touches the store, so a slow or unreachable bucket does not fail it.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::config::StoreBackend;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct GatewayStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub backend: StoreBackend,
    pub bucket: String,
    pub part_size: usize,
    pub concurrency: usize,
}

async fn status(State(state): State<AppState>) -> Json<GatewayStatus> {
    let config = state.config();
    Json(GatewayStatus {
        status: "healthy",
        service: "ssec-gateway",
        version: env!("CARGO_PKG_VERSION"),
        backend: config.storage.backend,
        bucket: state.bucket().to_string(),
        part_size: state.uploader().part_size(),
        concurrency: state.uploader().concurrency(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(status))
}
