//! Error types for the SSE-C transfer gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Gateway-level result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Startup configuration errors. All of these are fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("{name} is not valid base64")]
    InvalidKeyEncoding {
        name: &'static str,
        #[source]
        source: base64::DecodeError,
    },
}

/// Leaf errors reported by an object store call
#[derive(Error, Debug)]
pub enum StoreError {
    /// The request never produced a store response (connect, timeout, body I/O).
    #[error("Transport failure during {op}: {message}")]
    Transport { op: &'static str, message: String },

    /// The store answered and refused the request.
    #[error("Store rejected {op} ({code}, status {status:?}): {message}")]
    Rejected {
        op: &'static str,
        status: Option<u16>,
        code: String,
        message: String,
    },

    /// The object does not exist or cannot be opened with the supplied key.
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Errors from the multipart upload path
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Failed to open multipart upload")]
    InitFailed(#[source] StoreError),

    #[error("Failed to read upload input")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to upload part {part_number}")]
    PartUploadFailed {
        part_number: i32,
        #[source]
        source: StoreError,
    },

    /// The object may or may not exist after this error.
    #[error("Failed to complete multipart upload (outcome indeterminate)")]
    CompleteFailed(#[source] StoreError),

    #[error("Refusing to store an empty object")]
    EmptyInput,

    #[error("Input needs more than {max} parts")]
    TooManyParts { max: i32 },
}

/// Gateway error type. Every variant answers `400` with an empty body.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Multipart(#[from] axum::extract::multipart::MultipartError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %error_chain(&self), "Request failed");
        StatusCode::BAD_REQUEST.into_response()
    }
}

/// Render an error and all of its sources on one line
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
