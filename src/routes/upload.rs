//! Upload route
//!
//! POST /upload with a multipart form field `file`. The field is streamed
//! straight into a multipart upload; the request body is never held in full.
//! The object key is the last path segment of the file name the client
//! supplied, so it always fits the single-segment download route.

use std::io;

use axum::{
    extract::{Multipart, State},
    routing::post,
    Router,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Body returned on success
pub const UPLOAD_OK: &str = "upload successfully!";

/// Create the upload router
pub fn router() -> Router<AppState> {
    Router::new().route("/upload", post(upload))
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<&'static str> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            tracing::debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let key = field
            .file_name()
            .and_then(object_key)
            .ok_or_else(|| AppError::BadRequest("file field has no usable file name".to_string()))?;

        tracing::debug!(key = %key, content_type = ?field.content_type(), "Receiving upload");

        let reader = StreamReader::new(field.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
        tokio::pin!(reader);

        let object = state.uploader().upload(state.bucket(), &key, reader).await?;

        tracing::info!(
            key = %object.key,
            size = object.size,
            parts = object.parts,
            e_tag = ?object.e_tag,
            "Upload stored"
        );
        return Ok(UPLOAD_OK);
    }

    Err(AppError::BadRequest(
        "No file provided. Use field name 'file'".to_string(),
    ))
}

/// Object key for an uploaded file name: its last segment split on `/` or `\`
fn object_key(file_name: &str) -> Option<String> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match base {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}
