//! SSE-C streaming gateway
//!
//! An HTTP front for an S3-compatible object store. Uploads are relayed as
//! multipart uploads and downloads are streamed back, both encrypted at rest
//! with a customer-provided key (SSE-C) that never leaves this process
//! except in store request headers.

pub mod config;
pub mod encryption;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;
pub mod transfer;
