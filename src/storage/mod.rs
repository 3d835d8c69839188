//! Storage module for S3-compatible backends
//!
//! `S3Store` talks to AWS S3, MinIO, or any other S3-compatible service.
//! `MemoryStore` keeps everything in process for local runs and tests.

mod memory;
mod s3_client;
mod store;
mod types;

pub use memory::{FaultKind, MemoryStore, StoreCall};
pub use s3_client::S3Store;
pub use store::ObjectStore;
pub use types::*;
