//! Transfer engine
//!
//! Upload path: an inbound byte stream is cut into fixed-size parts, each part
//! is uploaded under the same SSE-C context, and the multipart upload is
//! either completed with an ascending part manifest or aborted.
//!
//! Download path: a decrypting object read is relayed in bounded chunks so
//! memory use does not depend on object size.

pub mod download;
pub mod part;
pub mod session;

pub use download::{DownloadHandle, ObjectDownloadStream};
pub use part::PartUploader;
pub use session::{MultipartUploader, SessionState, UploadSession};

/// Smallest part size the store accepts for every part except the last: 5 MiB
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Highest part number the store accepts
pub const MAX_PARTS: i32 = 10_000;

/// Part uploads in flight per session; 1 uploads strictly in order
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Relay buffer for downloads: 8 KiB
pub const RELAY_BUFFER_SIZE: usize = 8 * 1024;
