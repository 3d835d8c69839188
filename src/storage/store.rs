//! Object store trait
//!
//! Leaf network operations used by the transfer engine. Implementations must
//! not retry; a failed call surfaces exactly once to the caller.

use bytes::Bytes;

use crate::encryption::EncryptionContext;
use crate::error::StoreError;

use super::types::{CompletedUpload, ObjectBody, PartRecord, UploadTarget};

/// Trait for object store backends
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a multipart upload and return its upload id
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        ctx: &EncryptionContext,
    ) -> Result<String, StoreError>;

    /// Upload one part of an open multipart upload
    async fn upload_part(
        &self,
        target: &UploadTarget,
        part_number: i32,
        body: Bytes,
        ctx: &EncryptionContext,
    ) -> Result<PartRecord, StoreError>;

    /// Commit the upload. `parts` must be in ascending part-number order.
    async fn complete_multipart_upload(
        &self,
        target: &UploadTarget,
        parts: &[PartRecord],
        ctx: &EncryptionContext,
    ) -> Result<CompletedUpload, StoreError>;

    /// Discard an open multipart upload and any parts it holds
    async fn abort_multipart_upload(&self, target: &UploadTarget) -> Result<(), StoreError>;

    /// Open a decrypting read of an object
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        ctx: &EncryptionContext,
    ) -> Result<ObjectBody, StoreError>;

    /// Check that a bucket is reachable
    async fn head_bucket(&self, bucket: &str) -> Result<(), StoreError>;
}
