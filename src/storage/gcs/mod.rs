//! Google Cloud Storage backend.
//!
//! Objects go through OpenDAL's GCS service. Bucket creation uses the JSON
//! API with a token minted from the same service-account key. Creation is
//! attempted on every first initialization and a bucket the project already
//! owns counts as success. No policy document is applied; public access is
//! managed per object.

mod admin;
mod auth;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use opendal::services::Gcs;
use std::sync::Arc;
use tracing::{info, warn};

use self::admin::GcsBucketAdmin;
use self::auth::{FULL_CONTROL_SCOPE, ServiceAccountKey, TokenSource};
use super::backend::BackendCore;
use super::opendal_client::{OpendalClient, build_operator};
use super::paths;
use super::traits::{ObjectClient, StorageService};
use super::types::{FileObject, ObjectInfo, ObjectMeta, ObjectReader, Timeouts};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError, with_timeout};

/// Backend for Google Cloud Storage.
pub struct GcsBackend {
    core: BackendCore,
    service_account: String,
    project_id: String,
}

impl GcsBackend {
    /// Create a backend for `bucket` from the `storage` settings.
    ///
    /// Nothing is contacted until [`StorageService::initialize`].
    pub fn new(config: &StorageConfig, bucket: impl Into<String>) -> Self {
        Self {
            core: BackendCore::new(config, bucket.into(), Timeouts::default()),
            service_account: config.service_account.clone(),
            project_id: config.project_id.clone(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.core.timeouts = timeouts;
        self
    }

    /// Use `client` instead of connecting to the configured endpoint.
    pub fn with_client(mut self, client: Arc<dyn ObjectClient>) -> Self {
        self.core.prebuilt = Some(client);
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("endpoint", self.core.endpoint.as_str()),
            ("service_account", self.service_account.as_str()),
            ("project_id", self.project_id.as_str()),
            ("region", self.core.region.as_str()),
            ("bucket", self.core.bucket.as_str()),
            ("public_path", self.core.public_path.as_str()),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StorageError::config(format!(
                "cloud storage is missing: {}",
                missing.join(", ")
            )))
        }
    }

    fn connect(&self) -> Result<Arc<dyn ObjectClient>> {
        let key = ServiceAccountKey::from_json(&self.service_account)?;
        let tokens = Arc::new(TokenSource::new(key, FULL_CONTROL_SCOPE)?);

        let builder = Gcs::default()
            .bucket(&self.core.bucket)
            .endpoint(self.endpoint_base())
            .credential(&BASE64.encode(self.service_account.as_bytes()));
        let operator = build_operator(builder)?;

        let admin = GcsBucketAdmin::new(
            self.endpoint_base(),
            self.core.bucket.clone(),
            self.project_id.clone(),
            tokens,
        );
        Ok(Arc::new(OpendalClient::new(operator, Box::new(admin))))
    }

    fn endpoint_base(&self) -> &str {
        self.core.endpoint.trim_end_matches('/')
    }

    async fn ensure_bucket(&self, client: &dyn ObjectClient) -> Result<()> {
        with_timeout(
            "create bucket",
            self.core.timeouts.bucket,
            client.create_bucket(&self.core.region),
        )
        .await
        .map_err(|e| StorageError::transport("create bucket", format!("failed to ensure bucket: {}", e)))?;
        info!(bucket = %self.core.bucket, project = %self.project_id, "bucket ensured");
        Ok(())
    }

    /// Vendor download link for an object.
    fn download_link(&self, name: &str) -> String {
        format!(
            "{}/download/storage/v1/b/{}/o/{}?alt=media",
            self.endpoint_base(),
            self.core.bucket,
            urlencoding::encode(name)
        )
    }

    fn info(&self, meta: ObjectMeta) -> ObjectInfo {
        let self_link = self.download_link(&meta.key);
        let media_link = format!("/storage/{}", self_link);
        self.core.info(meta, self_link, media_link)
    }
}

#[async_trait]
impl StorageService for GcsBackend {
    async fn initialize(&self) -> Result<()> {
        self.core
            .client
            .get_or_try_init(|| async {
                self.validate()?;
                let client = match &self.core.prebuilt {
                    Some(client) => client.clone(),
                    None => self.connect()?,
                };
                self.ensure_bucket(client.as_ref()).await?;
                info!(
                    bucket = %self.core.bucket,
                    endpoint = %self.core.endpoint,
                    "cloud storage initialized"
                );
                Ok::<_, StorageError>(client)
            })
            .await?;
        Ok(())
    }

    async fn save_object(
        &self,
        reader: ObjectReader,
        path_hint: &str,
        content_type: &str,
    ) -> Result<ObjectInfo> {
        let name = paths::generate_object_name(path_hint);
        let meta = self.core.put(&name, reader, content_type).await?;
        Ok(self.info(meta))
    }

    async fn save_public_object(
        &self,
        reader: ObjectReader,
        path_hint: &str,
        content_type: &str,
    ) -> Result<ObjectInfo> {
        let name = self.core.public_name(&paths::generate_object_name(path_hint));
        let meta = self.core.put(&name, reader, content_type).await?;
        Ok(self.info(meta))
    }

    async fn copy_object(&self, src: &str, dst: &str) -> Result<ObjectInfo> {
        let meta = self.core.copy(src, dst).await?;
        Ok(self.info(meta))
    }

    async fn get_object(&self, name: &str) -> Result<FileObject> {
        let (reader, meta) = self.core.open(name).await?;
        Ok(FileObject {
            reader,
            info: self.info(meta),
        })
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        let result = match self.core.stat(name).await {
            Ok(_) => self.core.remove(name).await,
            Err(e) => Err(e),
        };
        result.inspect_err(|e| warn!(bucket = %self.core.bucket, key = %name, error = %e, "failed to delete object"))
    }

    async fn delete_bucket(&self) -> Result<()> {
        self.core.delete_bucket().await
    }

    async fn delete_path(&self, prefix: &str) -> Result<u64> {
        self.core.delete_path(prefix).await
    }

    async fn object_info(&self, name: &str) -> Result<ObjectInfo> {
        let meta = self.core.stat(name).await?;
        Ok(self.info(meta))
    }

    async fn shared_url(&self, name: &str) -> Result<String> {
        self.core.presign(name).await
    }

    async fn list_objects(&self, prefix: &str, recursive: bool) -> Result<Vec<String>> {
        self.core.list_keys(prefix, recursive).await
    }

    async fn folder_size(&self, prefix: &str, recursive: bool) -> Result<u64> {
        self.core.folder_size(prefix, recursive).await
    }

    async fn copy_path(&self, src: &str, dst: &str, recursive: bool) -> Result<u64> {
        self.core.copy_path(src, dst, recursive).await
    }

    async fn rename_folder(&self, src: &str, dst: &str) -> Result<()> {
        self.core.rename_folder(src, dst).await
    }

    fn bucket_name(&self) -> &str {
        &self.core.bucket
    }

    fn public_path(&self) -> &str {
        &self.core.public_path
    }

    fn region(&self) -> &str {
        &self.core.region
    }

    fn endpoint(&self) -> &str {
        &self.core.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryClient;

    fn config() -> StorageConfig {
        StorageConfig {
            platform: "gcs".to_string(),
            bucket: "docs".to_string(),
            region: "asia".to_string(),
            public_path: "public".to_string(),
            endpoint: "https://storage.googleapis.com/".to_string(),
            service_account: "{}".to_string(),
            project_id: "proj".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_links() {
        let backend = GcsBackend::new(&config(), "docs");
        let info = backend.info(ObjectMeta {
            key: "public/a b.txt".to_string(),
            size: 1,
            content_type: None,
            etag: None,
            last_modified: None,
        });

        assert_eq!(
            info.self_link,
            "https://storage.googleapis.com/download/storage/v1/b/docs/o/public%2Fa%20b.txt?alt=media"
        );
        assert_eq!(info.media_link, format!("/storage/{}", info.self_link));
    }

    #[tokio::test]
    async fn test_initialize_creates_without_policy() {
        let client = Arc::new(MemoryClient::with_bucket());
        let backend = GcsBackend::new(&config(), "docs").with_client(client.clone());

        backend.initialize().await.unwrap();
        assert_eq!(client.bucket_creations().await, 1);
        assert!(client.bucket_policy().await.is_none());
    }

    #[tokio::test]
    async fn test_initialize_rejects_missing_project() {
        let config = StorageConfig {
            project_id: String::new(),
            ..config()
        };
        let backend = GcsBackend::new(&config, "docs").with_client(Arc::new(MemoryClient::new()));

        let err = backend.initialize().await.unwrap_err();
        assert!(err.to_string().contains("project_id"));
    }

    #[tokio::test]
    async fn test_delete_missing_object_is_not_found() {
        let backend =
            GcsBackend::new(&config(), "docs").with_client(Arc::new(MemoryClient::new()));
        backend.initialize().await.unwrap();

        let err = backend.delete_object("missing.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
