//! Multipart upload sessions
//!
//! A session exists only for the duration of one upload request. It is not
//! persisted: if the process dies mid-upload the store keeps an orphaned
//! multipart upload until its own lifecycle rules remove it.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::{Fuse, FusedFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::encryption::KeyMaterial;
use crate::error::{error_chain, TransferError};
use crate::storage::{ObjectReference, ObjectStore, PartRecord, UploadTarget};

use super::part::PartUploader;
use super::{DEFAULT_CONCURRENCY, MAX_PARTS, MIN_PART_SIZE};

// ============================================================================
// Session State
// ============================================================================

/// Lifecycle of a multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Opened on the store, no part uploaded yet
    Initiated,
    /// Parts are being uploaded
    InProgress,
    /// Completion call issued
    Completing,
    /// Object committed
    Committed,
    /// Abort issued
    Aborted,
}

/// One multipart upload on the store
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub target: UploadTarget,
    pub parts: Vec<PartRecord>,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    last_assigned: i32,
}

impl UploadSession {
    pub fn new(target: UploadTarget) -> Self {
        Self {
            target,
            parts: Vec::new(),
            state: SessionState::Initiated,
            started_at: Utc::now(),
            last_assigned: 0,
        }
    }

    /// Upload id assigned by the store
    pub fn id(&self) -> &str {
        &self.target.upload_id
    }

    /// Assign the next part number, or `None` past the store's part limit
    pub fn next_part_number(&mut self) -> Option<i32> {
        if self.last_assigned >= MAX_PARTS {
            return None;
        }
        self.last_assigned += 1;
        self.state = SessionState::InProgress;
        Some(self.last_assigned)
    }

    /// Record an acknowledged part. Parts may arrive in any order.
    pub fn record_part(&mut self, record: PartRecord) {
        self.parts.push(record);
    }

    /// Acknowledged parts sorted by part number, as the completion call needs them
    pub fn manifest(&mut self) -> &[PartRecord] {
        self.parts.sort_by_key(|p| p.part_number);
        &self.parts
    }

    /// Whether the acknowledged parts are exactly 1..=N
    pub fn is_contiguous(&self) -> bool {
        let mut numbers: Vec<i32> = self.parts.iter().map(|p| p.part_number).collect();
        numbers.sort_unstable();
        numbers.iter().zip(1..).all(|(n, expected)| *n == expected)
    }

    pub fn total_bytes(&self) -> u64 {
        self.parts.iter().map(|p| p.size_bytes).sum()
    }
}

// ============================================================================
// Uploader
// ============================================================================

/// Drives multipart uploads for the gateway
#[derive(Clone)]
pub struct MultipartUploader {
    store: Arc<dyn ObjectStore>,
    keys: Arc<KeyMaterial>,
    parts: PartUploader,
    part_size: usize,
    concurrency: usize,
}

impl MultipartUploader {
    pub fn new(store: Arc<dyn ObjectStore>, keys: Arc<KeyMaterial>) -> Self {
        Self {
            parts: PartUploader::new(store.clone()),
            store,
            keys,
            part_size: MIN_PART_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set the part size. Values below [`MIN_PART_SIZE`] only work against
    /// stores that do not enforce the minimum.
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    /// Allow up to `concurrency` part uploads in flight
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Upload everything `reader` yields as `bucket/key`.
    ///
    /// Empty input is rejected before anything is sent to the store. Any
    /// failure after the upload is opened aborts it exactly once; the abort's
    /// own failure is logged and never replaces the original error.
    pub async fn upload<R>(
        &self,
        bucket: &str,
        key: &str,
        reader: R,
    ) -> Result<ObjectReference, TransferError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut reader = reader;

        let first = read_chunk(&mut reader, self.part_size)
            .await
            .map_err(TransferError::ReadFailed)?;
        if first.is_empty() {
            tracing::warn!(bucket = %bucket, key = %key, "Rejecting empty upload");
            return Err(TransferError::EmptyInput);
        }

        let ctx = self.keys.context();
        tracing::info!(bucket = %bucket, key = %key, "Initiating multipart upload");

        let upload_id = self
            .store
            .create_multipart_upload(bucket, key, ctx)
            .await
            .map_err(|e| {
                tracing::error!(
                    bucket = %bucket,
                    key = %key,
                    error = %e,
                    "Multipart upload init failed"
                );
                TransferError::InitFailed(e)
            })?;

        let mut session = UploadSession::new(UploadTarget {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
        });
        let mut guard = AbortOnDrop::new(self.store.clone(), session.target.clone());

        if let Err(err) = self.upload_parts(&mut session, first, &mut reader).await {
            guard.disarm();
            self.abort(&mut session).await;
            return Err(err);
        }

        session.state = SessionState::Completing;
        let manifest = session.manifest().to_vec();
        debug_assert!(session.is_contiguous());

        tracing::info!(
            upload_id = %session.id(),
            parts = manifest.len(),
            "Completing multipart upload"
        );

        let completed = self
            .store
            .complete_multipart_upload(&session.target, &manifest, ctx)
            .await;
        guard.disarm();

        match completed {
            Ok(done) => {
                session.state = SessionState::Committed;
                let elapsed = Utc::now() - session.started_at;
                tracing::info!(
                    upload_id = %session.id(),
                    key = %key,
                    parts = manifest.len(),
                    bytes = session.total_bytes(),
                    elapsed_ms = elapsed.num_milliseconds(),
                    "Multipart upload committed"
                );

                Ok(ObjectReference {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    e_tag: done.e_tag,
                    location: done.location,
                    parts: manifest.len(),
                    size: session.total_bytes(),
                })
            }
            Err(e) => {
                tracing::error!(
                    upload_id = %session.id(),
                    key = %key,
                    error = %e,
                    "Multipart completion failed; object state is indeterminate"
                );
                Err(TransferError::CompleteFailed(e))
            }
        }
    }

    /// Read the input into parts and upload them, keeping at most
    /// `concurrency` uploads in flight. The next chunk is read while parts
    /// are uploading, so at most `concurrency + 1` chunks are buffered.
    /// Returns on the first failure, which drops (cancels) whatever is
    /// still in flight.
    async fn upload_parts<R>(
        &self,
        session: &mut UploadSession,
        first: Bytes,
        reader: &mut R,
    ) -> Result<(), TransferError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let ctx = self.keys.context();
        let target = session.target.clone();
        let target = &target;
        let parts = &self.parts;
        let part_size = self.part_size;

        let mut in_flight = FuturesUnordered::new();
        // Chunks are filled completely, so a short one is the last one
        let mut exhausted = first.len() < part_size;
        let mut ready = Some(first);
        let mut idle_reader = Some(reader);

        let reading = Fuse::terminated();
        tokio::pin!(reading);

        loop {
            if in_flight.len() < self.concurrency {
                if let Some(chunk) = ready.take() {
                    let part_number = session
                        .next_part_number()
                        .ok_or(TransferError::TooManyParts { max: MAX_PARTS })?;
                    in_flight.push(async move {
                        let result = parts.upload_part(target, part_number, chunk, ctx).await;
                        (part_number, result)
                    });
                }
            }

            if ready.is_none() && !exhausted {
                if let Some(reader) = idle_reader.take() {
                    reading.set(read_next_chunk(reader, part_size).fuse());
                }
            }

            let read_pending = !reading.is_terminated();
            if in_flight.is_empty() && !read_pending {
                return Ok(());
            }

            tokio::select! {
                biased;

                Some((part_number, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    match result {
                        Ok(record) => session.record_part(record),
                        Err(source) => {
                            tracing::error!(
                                upload_id = %target.upload_id,
                                part_number = part_number,
                                error = %source,
                                "Part upload failed"
                            );
                            return Err(TransferError::PartUploadFailed {
                                part_number,
                                source,
                            });
                        }
                    }
                }

                (reader, chunk) = &mut reading, if read_pending => {
                    idle_reader = Some(reader);
                    let chunk = chunk.map_err(|e| {
                        tracing::error!(
                            upload_id = %target.upload_id,
                            error = %e,
                            "Reading upload input failed"
                        );
                        TransferError::ReadFailed(e)
                    })?;
                    if chunk.len() < part_size {
                        exhausted = true;
                    }
                    if !chunk.is_empty() {
                        ready = Some(chunk);
                    }
                }
            }
        }
    }

    /// Best-effort abort; failures are logged only
    async fn abort(&self, session: &mut UploadSession) {
        match self.store.abort_multipart_upload(&session.target).await {
            Ok(()) => {
                tracing::info!(upload_id = %session.id(), "Multipart upload aborted");
            }
            Err(e) => {
                tracing::warn!(
                    upload_id = %session.id(),
                    error = %error_chain(&e),
                    "Abort failed; upload stays orphaned until the store expires it"
                );
            }
        }
        session.state = SessionState::Aborted;
    }
}

/// Read the next chunk, handing the reader back for the read after it
async fn read_next_chunk<R>(reader: &mut R, size: usize) -> (&mut R, io::Result<Bytes>)
where
    R: AsyncRead + Unpin,
{
    let chunk = read_chunk(&mut *reader, size).await;
    (reader, chunk)
}

/// Read up to `size` bytes, stopping early only at end of input
async fn read_chunk<R>(reader: &mut R, size: usize) -> io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(size);
    reader.take(size as u64).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Aborts the upload if the request future is dropped before it finishes,
/// e.g. when the client disconnects mid-upload.
struct AbortOnDrop {
    store: Option<Arc<dyn ObjectStore>>,
    target: UploadTarget,
}

impl AbortOnDrop {
    fn new(store: Arc<dyn ObjectStore>, target: UploadTarget) -> Self {
        Self {
            store: Some(store),
            target,
        }
    }

    fn disarm(&mut self) {
        self.store = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        let target = self.target.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(upload_id = %target.upload_id, "Upload cancelled; aborting session");
                handle.spawn(async move {
                    if let Err(e) = store.abort_multipart_upload(&target).await {
                        tracing::warn!(
                            upload_id = %target.upload_id,
                            error = %e,
                            "Abort after cancellation failed"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    upload_id = %target.upload_id,
                    "No runtime to abort cancelled upload"
                );
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
