//! Application state management

use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::encryption::KeyMaterial;
use crate::storage::{MemoryStore, ObjectStore, S3Store};
use crate::transfer::MultipartUploader;

/// Shared application state
///
/// Everything in here is read-only after startup, so request handlers share
/// it without locking.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: Arc<dyn ObjectStore>,
    keys: Arc<KeyMaterial>,
    uploader: MultipartUploader,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, store: Arc<dyn ObjectStore>, keys: Arc<KeyMaterial>) -> Self {
        let uploader = MultipartUploader::new(store.clone(), keys.clone())
            .with_part_size(config.transfer.part_size)
            .with_concurrency(config.transfer.concurrency);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                keys,
                uploader,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Bucket every transfer goes to
    pub fn bucket(&self) -> &str {
        &self.inner.config.storage.bucket
    }

    /// Get the object store
    pub fn store(&self) -> &dyn ObjectStore {
        self.inner.store.as_ref()
    }

    /// Get the SSE-C key material
    pub fn keys(&self) -> &KeyMaterial {
        &self.inner.keys
    }

    /// Get the multipart uploader
    pub fn uploader(&self) -> &MultipartUploader {
        &self.inner.uploader
    }
}

/// Build the object store selected by configuration
pub async fn connect_store(config: &Config) -> Arc<dyn ObjectStore> {
    let store: Arc<dyn ObjectStore> = match config.storage.backend {
        StoreBackend::S3 => {
            tracing::info!(
                region = %config.storage.region,
                endpoint = ?config.storage.endpoint,
                credentials = ?config.storage.credentials,
                "Using S3 store"
            );
            Arc::new(S3Store::new(&config.storage).await)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; objects are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Probe the bucket, but keep going if it fails
    let bucket = &config.storage.bucket;
    match store.head_bucket(bucket).await {
        Ok(()) => tracing::info!("Connected to bucket: {}", bucket),
        Err(e) => tracing::warn!(
            "Could not verify bucket {}: {}. Will attempt operations anyway.",
            bucket,
            e
        ),
    }

    store
}
