//! Download route
//!
//! GET /download/:filename streams the decrypted object back to the client.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::get,
    Router,
};

use crate::error::Result;
use crate::state::AppState;
use crate::transfer::ObjectDownloadStream;

/// Create the download router
pub fn router() -> Router<AppState> {
    Router::new().route("/download/:filename", get(download))
}

async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response> {
    let stream = ObjectDownloadStream::open(
        state.store(),
        state.bucket(),
        &filename,
        state.keys().context(),
    )
    .await?;

    let content_type = stream
        .content_type()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| guess_content_type(&filename));
    let total_size = stream.total_size();

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);
    // Unknown length is left unset so the response goes out chunked
    if let Some(size) = total_size {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }

    tracing::info!(key = %filename, size = ?total_size, "Streaming download");
    Ok(response)
}

/// Guess content type from file extension
fn guess_content_type(filename: &str) -> HeaderValue {
    let mime = mime_guess::from_path(filename).first_or_octet_stream();
    HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}
