//! Storage backend factory.
//!
//! The factory holds the validated `storage` configuration and builds the
//! backend for its platform: `gcs` gives the cloud-bucket backend, anything
//! else the S3-compatible one. A process-wide factory is set up once with
//! [`init_storage_client`] and used by the free [`new_client`].
//!
//! # Example
//!
//! ```ignore
//! use cloudstore::storage::{init_storage_client, new_client};
//!
//! init_storage_client().await?;
//!
//! // Bucket "{bucket}-tenant42", created if missing.
//! let storage = new_client("tenant42").await?;
//! let names = storage.list_objects("notes/", true).await?;
//! ```

use async_lock::OnceCell;
use std::sync::Arc;
use tracing::info;

use super::gcs::GcsBackend;
use super::s3::S3Backend;
use super::traits::{BoxedStorageService, ObjectClient};
use super::types::Timeouts;
use crate::config::{Platform, StorageConfig};
use crate::error::{Result, StorageError};

static FACTORY: OnceCell<StorageFactory> = OnceCell::new();

/// Builds storage backends from one validated configuration.
#[derive(Clone)]
pub struct StorageFactory {
    config: StorageConfig,
    timeouts: Timeouts,
    client: Option<Arc<dyn ObjectClient>>,
}

impl std::fmt::Debug for StorageFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageFactory")
            .field("platform", &self.config.platform)
            .field("bucket", &self.config.bucket)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl StorageFactory {
    /// Validate `config` for its platform.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Config` naming every missing field.
    pub fn from_config(config: StorageConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            timeouts: Timeouts::default(),
            client: None,
        })
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Give every backend `client` instead of a vendor connection.
    pub fn with_client(mut self, client: Arc<dyn ObjectClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Effective bucket name: `{bucket}-{suffix}`, or the configured bucket
    /// when the suffix is empty.
    pub fn bucket_for(&self, bucket_suffix: &str) -> String {
        if bucket_suffix.is_empty() {
            self.config.bucket.clone()
        } else {
            format!("{}-{}", self.config.bucket, bucket_suffix)
        }
    }

    /// Build the backend without initializing it.
    pub fn build_backend(&self, bucket_suffix: &str) -> BoxedStorageService {
        let bucket = self.bucket_for(bucket_suffix);
        match self.config.platform() {
            Platform::Gcs => {
                let backend = GcsBackend::new(&self.config, bucket).with_timeouts(self.timeouts);
                match &self.client {
                    Some(client) => Box::new(backend.with_client(client.clone())),
                    None => Box::new(backend),
                }
            }
            Platform::Minio | Platform::Other(_) => {
                let backend = S3Backend::new(&self.config, bucket).with_timeouts(self.timeouts);
                match &self.client {
                    Some(client) => Box::new(backend.with_client(client.clone())),
                    None => Box::new(backend),
                }
            }
        }
    }

    /// Build and initialize a backend.
    pub async fn new_client(&self, bucket_suffix: &str) -> Result<BoxedStorageService> {
        let backend = self.build_backend(bucket_suffix);
        backend.initialize().await?;
        Ok(backend)
    }
}

/// Load the `storage` configuration and set up the process-wide factory.
///
/// Runs once; later calls return the same factory. Errors are returned
/// rather than aborting so the caller decides whether they are fatal.
pub async fn init_storage_client() -> Result<&'static StorageFactory> {
    FACTORY
        .get_or_try_init(|| async {
            let factory = StorageFactory::from_config(StorageConfig::load()?)?;
            info!(
                platform = %factory.config.platform,
                bucket = %factory.config.bucket,
                "storage client configured"
            );
            Ok::<_, StorageError>(factory)
        })
        .await
}

/// Build and initialize a backend from the process-wide factory.
pub async fn new_client(bucket_suffix: &str) -> Result<BoxedStorageService> {
    let factory = FACTORY.get().ok_or_else(|| {
        StorageError::config("storage factory not initialized, call init_storage_client first")
    })?;
    factory.new_client(bucket_suffix).await
}
