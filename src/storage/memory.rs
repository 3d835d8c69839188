//! In-process object store
//!
//! Behaves like an SSE-C enabled S3 bucket closely enough to exercise the
//! transfer engine: uploads are keyed by encryption context, completion
//! manifests are validated, and every call is journaled. Faults can be
//! injected per operation for tests.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::encryption::EncryptionContext;
use crate::error::StoreError;

use super::store::ObjectStore;
use super::types::{CompletedUpload, ObjectBody, PartRecord, UploadTarget};

/// A call received by the memory store, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateMultipartUpload { key: String },
    UploadPart {
        upload_id: String,
        part_number: i32,
        size: u64,
    },
    CompleteMultipartUpload {
        upload_id: String,
        part_numbers: Vec<i32>,
    },
    AbortMultipartUpload { upload_id: String },
    GetObject { key: String },
    HeadBucket { bucket: String },
}

/// Kind of failure to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Transport,
    Rejected,
}

impl FaultKind {
    fn into_error(self, op: &'static str) -> StoreError {
        match self {
            FaultKind::Transport => StoreError::Transport {
                op,
                message: "injected transport failure".to_string(),
            },
            FaultKind::Rejected => StoreError::Rejected {
                op,
                status: Some(500),
                code: "InjectedFault".to_string(),
                message: "injected rejection".to_string(),
            },
        }
    }
}

/// In-memory object store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    objects: HashMap<(String, String), StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    /// Call journal; only kept when recording is on
    calls: Vec<StoreCall>,
    recording: bool,
    faults: Faults,
}

impl MemoryInner {
    fn record(&mut self, call: StoreCall) {
        if self.recording {
            self.calls.push(call);
        }
    }
}

#[derive(Default)]
struct Faults {
    create: Option<FaultKind>,
    complete: Option<FaultKind>,
    abort: Option<FaultKind>,
    parts: HashMap<i32, FaultKind>,
    part_delays: HashMap<i32, Duration>,
    hide_content_length: bool,
}

struct StoredObject {
    data: Bytes,
    key_digest: String,
    e_tag: String,
}

struct PendingUpload {
    bucket: String,
    key: String,
    key_digest: String,
    parts: HashMap<i32, (String, Bytes)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that journals every call it receives, for inspection in tests
    pub fn recording() -> Self {
        let inner = MemoryInner {
            recording: true,
            ..MemoryInner::default()
        };
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    pub async fn fail_create(&self, kind: FaultKind) {
        self.inner.write().await.faults.create = Some(kind);
    }

    pub async fn fail_part(&self, part_number: i32, kind: FaultKind) {
        self.inner.write().await.faults.parts.insert(part_number, kind);
    }

    pub async fn fail_complete(&self, kind: FaultKind) {
        self.inner.write().await.faults.complete = Some(kind);
    }

    pub async fn fail_abort(&self, kind: FaultKind) {
        self.inner.write().await.faults.abort = Some(kind);
    }

    /// Hold the upload of one part for `delay` before acknowledging it
    pub async fn delay_part(&self, part_number: i32, delay: Duration) {
        self.inner
            .write()
            .await
            .faults
            .part_delays
            .insert(part_number, delay);
    }

    /// Serve objects without a declared length
    pub async fn hide_content_length(&self) {
        self.inner.write().await.faults.hide_content_length = true;
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Every call received so far. Empty unless built with [`MemoryStore::recording`].
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.read().await.calls.clone()
    }

    /// Upload ids that are still open (neither completed nor aborted)
    pub async fn open_uploads(&self) -> Vec<String> {
        self.inner.read().await.uploads.keys().cloned().collect()
    }

    /// Raw stored bytes, bypassing the encryption context check
    pub async fn object_data(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.inner
            .read()
            .await
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.data.clone())
    }

    /// Store an object directly
    pub async fn insert_object(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        ctx: &EncryptionContext,
    ) {
        let data = data.into();
        let e_tag = format!("\"{:x}\"", md5::compute(&data));
        self.inner.write().await.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                key_digest: ctx.key_digest_header().to_string(),
                e_tag,
            },
        );
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        ctx: &EncryptionContext,
    ) -> Result<String, StoreError> {
        let mut inner = self.inner.write().await;
        inner.record(StoreCall::CreateMultipartUpload {
            key: key.to_string(),
        });

        if let Some(kind) = inner.faults.create {
            return Err(kind.into_error("CreateMultipartUpload"));
        }

        let upload_id = Uuid::new_v4().to_string();
        inner.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                key_digest: ctx.key_digest_header().to_string(),
                parts: HashMap::new(),
            },
        );

        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        target: &UploadTarget,
        part_number: i32,
        body: Bytes,
        ctx: &EncryptionContext,
    ) -> Result<PartRecord, StoreError> {
        let delay = {
            let mut inner = self.inner.write().await;
            inner.record(StoreCall::UploadPart {
                upload_id: target.upload_id.clone(),
                part_number,
                size: body.len() as u64,
            });
            inner.faults.part_delays.get(&part_number).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.write().await;
        if let Some(kind) = inner.faults.parts.get(&part_number).copied() {
            return Err(kind.into_error("UploadPart"));
        }

        let upload = inner
            .uploads
            .get_mut(&target.upload_id)
            .ok_or_else(|| no_such_upload("UploadPart", &target.upload_id))?;

        if upload.key_digest != ctx.key_digest_header() {
            return Err(StoreError::Rejected {
                op: "UploadPart",
                status: Some(400),
                code: "InvalidArgument".to_string(),
                message: "encryption context differs from the one the upload was opened with"
                    .to_string(),
            });
        }

        let e_tag = format!("\"{:x}\"", md5::compute(&body));
        let size_bytes = body.len() as u64;
        upload.parts.insert(part_number, (e_tag.clone(), body));

        Ok(PartRecord {
            part_number,
            e_tag,
            size_bytes,
        })
    }

    async fn complete_multipart_upload(
        &self,
        target: &UploadTarget,
        parts: &[PartRecord],
        ctx: &EncryptionContext,
    ) -> Result<CompletedUpload, StoreError> {
        let mut inner = self.inner.write().await;
        inner.record(StoreCall::CompleteMultipartUpload {
            upload_id: target.upload_id.clone(),
            part_numbers: parts.iter().map(|p| p.part_number).collect(),
        });

        if let Some(kind) = inner.faults.complete {
            return Err(kind.into_error("CompleteMultipartUpload"));
        }

        let upload = inner
            .uploads
            .get(&target.upload_id)
            .ok_or_else(|| no_such_upload("CompleteMultipartUpload", &target.upload_id))?;

        if upload.key_digest != ctx.key_digest_header() {
            return Err(invalid_part("encryption context mismatch"));
        }
        if parts.is_empty() {
            return Err(StoreError::Rejected {
                op: "CompleteMultipartUpload",
                status: Some(400),
                code: "MalformedXML".to_string(),
                message: "at least one part is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut previous = 0;
        let mut data = BytesMut::new();
        for part in parts {
            if part.part_number <= previous || !seen.insert(part.part_number) {
                return Err(StoreError::Rejected {
                    op: "CompleteMultipartUpload",
                    status: Some(400),
                    code: "InvalidPartOrder".to_string(),
                    message: format!("part {} is out of order", part.part_number),
                });
            }
            previous = part.part_number;

            match upload.parts.get(&part.part_number) {
                Some((e_tag, bytes)) if *e_tag == part.e_tag => data.extend_from_slice(bytes),
                _ => return Err(invalid_part(&format!("part {} does not match", part.part_number))),
            }
        }

        let data = data.freeze();
        let e_tag = format!("\"{:x}-{}\"", md5::compute(&data), parts.len());
        let location = format!("memory://{}/{}", upload.bucket, upload.key);
        let object_key = (upload.bucket.clone(), upload.key.clone());
        let key_digest = upload.key_digest.clone();

        inner.uploads.remove(&target.upload_id);
        inner.objects.insert(
            object_key,
            StoredObject {
                data,
                key_digest,
                e_tag: e_tag.clone(),
            },
        );

        Ok(CompletedUpload {
            e_tag: Some(e_tag),
            location: Some(location),
        })
    }

    async fn abort_multipart_upload(&self, target: &UploadTarget) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.record(StoreCall::AbortMultipartUpload {
            upload_id: target.upload_id.clone(),
        });

        if let Some(kind) = inner.faults.abort {
            return Err(kind.into_error("AbortMultipartUpload"));
        }

        inner
            .uploads
            .remove(&target.upload_id)
            .map(|_| ())
            .ok_or_else(|| no_such_upload("AbortMultipartUpload", &target.upload_id))
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        ctx: &EncryptionContext,
    ) -> Result<ObjectBody, StoreError> {
        let mut inner = self.inner.write().await;
        inner.record(StoreCall::GetObject {
            key: key.to_string(),
        });

        let object = inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .filter(|object| object.key_digest == ctx.key_digest_header())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let mut body = ObjectBody::new(Cursor::new(object.data.clone()));
        body.e_tag = Some(object.e_tag.clone());
        if !inner.faults.hide_content_length {
            body.content_length = Some(object.data.len() as u64);
        }
        Ok(body)
    }

    async fn head_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.inner.write().await.record(StoreCall::HeadBucket {
            bucket: bucket.to_string(),
        });
        Ok(())
    }
}

fn no_such_upload(op: &'static str, upload_id: &str) -> StoreError {
    StoreError::Rejected {
        op,
        status: Some(404),
        code: "NoSuchUpload".to_string(),
        message: format!("upload {} does not exist", upload_id),
    }
}

fn invalid_part(message: &str) -> StoreError {
    StoreError::Rejected {
        op: "CompleteMultipartUpload",
        status: Some(400),
        code: "InvalidPart".to_string(),
        message: message.to_string(),
    }
}
