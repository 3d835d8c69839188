//! Streaming object downloads
//!
//! The store body is relayed in chunks of at most [`RELAY_BUFFER_SIZE`]
//! bytes, pulled only as fast as the HTTP response is consumed.
//!
//! Known limitation: once the first chunk has been handed to the response the
//! status line and headers are on the wire. A store read error after that
//! point cannot be turned into an error status; the stream yields the error,
//! which makes the server drop the connection so the client sees a truncated
//! transfer instead of a silently short body.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::encryption::EncryptionContext;
use crate::error::StoreError;
use crate::storage::{ObjectBody, ObjectStore};

use super::RELAY_BUFFER_SIZE;

/// Position of one in-progress download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadHandle {
    pub object_key: String,
    /// Declared size, if the store reported one
    pub total_size: Option<u64>,
    /// Bytes relayed so far
    pub cursor: u64,
}

/// Lazy, finite, non-restartable stream of a decrypted object
pub struct ObjectDownloadStream {
    handle: DownloadHandle,
    content_type: Option<String>,
    inner: ReaderStream<Box<dyn AsyncRead + Send + Unpin>>,
    finished: bool,
}

impl ObjectDownloadStream {
    /// Open `bucket/key` for reading under the given encryption context
    pub async fn open(
        store: &dyn ObjectStore,
        bucket: &str,
        key: &str,
        ctx: &EncryptionContext,
    ) -> Result<Self, StoreError> {
        let body = store.get_object(bucket, key, ctx).await.map_err(|e| {
            tracing::warn!(bucket = %bucket, key = %key, error = %e, "Failed to open object");
            e
        })?;

        tracing::debug!(
            key = %key,
            content_length = ?body.content_length,
            "Opened object stream"
        );

        Ok(Self::from_body(key, body, RELAY_BUFFER_SIZE))
    }

    /// Wrap an already opened body, relaying at most `buffer_size` bytes per chunk
    pub fn from_body(key: &str, body: ObjectBody, buffer_size: usize) -> Self {
        Self {
            handle: DownloadHandle {
                object_key: key.to_string(),
                total_size: body.content_length,
                cursor: 0,
            },
            content_type: body.content_type,
            inner: ReaderStream::with_capacity(body.reader, buffer_size.max(1)),
            finished: false,
        }
    }

    pub fn total_size(&self) -> Option<u64> {
        self.handle.total_size
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn handle(&self) -> &DownloadHandle {
        &self.handle
    }
}

impl Stream for ObjectDownloadStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
            Some(Ok(chunk)) => {
                self.handle.cursor += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(err)) => {
                self.finished = true;
                tracing::error!(
                    key = %self.handle.object_key,
                    bytes_sent = self.handle.cursor,
                    error = %err,
                    "Object stream failed mid-transfer; terminating response"
                );
                Poll::Ready(Some(Err(err)))
            }
            None => {
                self.finished = true;
                let handle = &self.handle;
                match handle.total_size {
                    Some(total) if handle.cursor < total => {
                        tracing::error!(
                            key = %handle.object_key,
                            bytes_sent = handle.cursor,
                            declared = total,
                            "Object stream ended early; terminating response"
                        );
                        Poll::Ready(Some(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("object ended after {} of {} bytes", handle.cursor, total),
                        ))))
                    }
                    _ => {
                        tracing::debug!(
                            key = %handle.object_key,
                            bytes_sent = handle.cursor,
                            "Object stream finished"
                        );
                        Poll::Ready(None)
                    }
                }
            }
        }
    }
}
