//! Single part upload

use std::sync::Arc;

use bytes::Bytes;

use crate::encryption::EncryptionContext;
use crate::error::StoreError;
use crate::storage::{ObjectStore, PartRecord, UploadTarget};

/// Uploads one bounded chunk of an open multipart upload.
///
/// There is no retry here. A transport failure or store rejection is returned
/// as-is and the caller decides what happens to the session.
#[derive(Clone)]
pub struct PartUploader {
    store: Arc<dyn ObjectStore>,
}

impl PartUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn upload_part(
        &self,
        target: &UploadTarget,
        part_number: i32,
        chunk: Bytes,
        ctx: &EncryptionContext,
    ) -> Result<PartRecord, StoreError> {
        debug_assert!(part_number >= 1, "part numbers start at 1");
        let bytes = chunk.len();

        tracing::debug!(
            upload_id = %target.upload_id,
            part_number = part_number,
            bytes = bytes,
            "Uploading part"
        );

        let record = self
            .store
            .upload_part(target, part_number, chunk, ctx)
            .await?;

        tracing::debug!(
            upload_id = %target.upload_id,
            part_number = part_number,
            e_tag = %record.e_tag,
            "Part acknowledged"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::KeyMaterial;
    use crate::storage::{FaultKind, MemoryStore};

    async fn open(store: &MemoryStore, keys: &KeyMaterial) -> UploadTarget {
        let upload_id = store
            .create_multipart_upload("bucket", "obj", keys.context())
            .await
            .unwrap();
        UploadTarget {
            bucket: "bucket".to_string(),
            key: "obj".to_string(),
            upload_id,
        }
    }

    #[tokio::test]
    async fn test_upload_part_returns_record() {
        let store = MemoryStore::recording();
        let keys = KeyMaterial::from_raw_key(vec![3u8; 32]);
        let target = open(&store, &keys).await;
        let uploader = PartUploader::new(Arc::new(store.clone()));

        let record = uploader
            .upload_part(&target, 1, Bytes::from_static(b"abc"), keys.context())
            .await
            .unwrap();

        assert_eq!(record.part_number, 1);
        assert_eq!(record.size_bytes, 3);
        assert!(!record.e_tag.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let store = MemoryStore::recording();
        let keys = KeyMaterial::from_raw_key(vec![3u8; 32]);
        let target = open(&store, &keys).await;
        store.fail_part(1, FaultKind::Transport).await;
        let uploader = PartUploader::new(Arc::new(store.clone()));

        let err = uploader
            .upload_part(&target, 1, Bytes::from_static(b"abc"), keys.context())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Transport { .. }));
        let attempts = store
            .calls()
            .await
            .into_iter()
            .filter(|c| matches!(c, crate::storage::StoreCall::UploadPart { .. }))
            .count();
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_rejection_maps_to_rejected() {
        let store = MemoryStore::recording();
        let keys = KeyMaterial::from_raw_key(vec![3u8; 32]);
        let target = open(&store, &keys).await;
        let other_keys = KeyMaterial::from_raw_key(vec![4u8; 32]);
        let uploader = PartUploader::new(Arc::new(store));

        let err = uploader
            .upload_part(&target, 1, Bytes::from_static(b"abc"), other_keys.context())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Rejected { .. }));
    }
}
