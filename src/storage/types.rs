//! Storage types

use std::fmt;

use serde::Serialize;
use tokio::io::AsyncRead;

/// Identifies an open multipart upload on the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTarget {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

/// The store's acknowledgment of one uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartRecord {
    /// 1-based part number
    pub part_number: i32,
    /// Opaque tag returned by the store, echoed back on completion
    pub e_tag: String,
    pub size_bytes: u64,
}

/// What the store reports after a successful completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedUpload {
    pub e_tag: Option<String>,
    pub location: Option<String>,
}

/// A committed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectReference {
    pub bucket: String,
    pub key: String,
    pub e_tag: Option<String>,
    pub location: Option<String>,
    pub parts: usize,
    pub size: u64,
}

/// Live, decrypted body of a stored object
pub struct ObjectBody {
    /// Declared size; `None` when the store did not report one
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub e_tag: Option<String>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl ObjectBody {
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            content_length: None,
            content_type: None,
            e_tag: None,
            reader: Box::new(reader),
        }
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("e_tag", &self.e_tag)
            .finish_non_exhaustive()
    }
}
