//! S3-compatible storage backend.
//!
//! Serves MinIO, AWS S3 and any other S3-compatible service. Objects go
//! through OpenDAL's S3 service; bucket existence, creation and policy go
//! through signed REST calls.
//!
//! On first initialization the bucket is created when missing, and only a
//! freshly created bucket gets the public-read policy for the public path.

mod admin;
mod policy;
mod sigv4;

pub use policy::public_read_policy;

use async_trait::async_trait;
use opendal::services::S3;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use self::admin::S3BucketAdmin;
use self::sigv4::Credentials;
use super::backend::BackendCore;
use super::opendal_client::{OpendalClient, build_operator};
use super::paths;
use super::traits::{ObjectClient, StorageService};
use super::types::{FileObject, ObjectInfo, ObjectMeta, ObjectReader, Timeouts};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError, with_timeout};

/// Backend for S3-compatible services.
pub struct S3Backend {
    core: BackendCore,
    access_id: String,
    secret_key: String,
    use_ssl: bool,
}

impl S3Backend {
    /// Create a backend for `bucket` from the `storage` settings.
    ///
    /// Nothing is contacted until [`StorageService::initialize`].
    pub fn new(config: &StorageConfig, bucket: impl Into<String>) -> Self {
        Self {
            core: BackendCore::new(config, bucket.into(), Timeouts::default()),
            access_id: config.access_id.clone(),
            secret_key: config.secret_key.clone(),
            use_ssl: config.use_ssl,
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

    fn validate(&self) -> Result<()> {
        let fields = [
            ("endpoint", self.core.endpoint.as_str()),
            ("access_id", self.access_id.as_str()),
            ("secret_key", self.secret_key.as_str()),
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
                "S3-compatible storage is missing: {}",
                missing.join(", ")
            )))
        }
    }

    fn connect(&self) -> Result<Arc<dyn ObjectClient>> {
        let endpoint = endpoint_url(&self.core.endpoint, self.use_ssl)?;

        let builder = S3::default()
            .bucket(&self.core.bucket)
            .region(&self.core.region)
            .endpoint(&endpoint.origin().ascii_serialization())
            .access_key_id(&self.access_id)
            .secret_access_key(&self.secret_key);
        let operator = build_operator(builder)?;

        let admin = S3BucketAdmin::new(
            endpoint,
            self.core.bucket.clone(),
            Credentials {
                access_key: self.access_id.clone(),
                secret_key: self.secret_key.clone(),
                region: self.core.region.clone(),
            },
        );
        Ok(Arc::new(OpendalClient::new(operator, Box::new(admin))))
    }

    /// Create the bucket if it is missing and open up the public path.
    async fn ensure_bucket(&self, client: &dyn ObjectClient) -> Result<()> {
        let bucket = &self.core.bucket;
        let timeout = self.core.timeouts.bucket;

        let found = match with_timeout("head bucket", timeout, client.bucket_exists()).await {
            Ok(found) => found,
            Err(e) => {
                info!(bucket = %bucket, error = %e, "checking bucket failed, creating it");
                false
            }
        };
        if found {
            debug!(bucket = %bucket, "bucket exists");
            return Ok(());
        }

        with_timeout(
            "create bucket",
            timeout,
            client.create_bucket(&self.core.region),
        )
        .await?;
        info!(bucket = %bucket, region = %self.core.region, "bucket created");

        let policy = public_read_policy(bucket, &self.core.public_path);
        with_timeout("put bucket policy", timeout, client.put_bucket_policy(&policy))
            .await
            .map_err(|e| {
                StorageError::transport("put bucket policy", format!("failed to open public path: {}", e))
            })?;
        info!(bucket = %bucket, public_path = %self.core.public_path, "public read policy applied");
        Ok(())
    }

    fn info(&self, meta: ObjectMeta) -> ObjectInfo {
        let self_link = format!("{}/{}", self.core.bucket, meta.key);
        let media_link = format!("/storage/{}/{}", self.core.bucket, meta.key);
        self.core.info(meta, self_link, media_link)
    }
}

/// Endpoint as a URL, adding a scheme from `use_ssl` when it has none.
pub(crate) fn endpoint_url(endpoint: &str, use_ssl: bool) -> Result<Url> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let candidate = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        let scheme = if use_ssl { "https" } else { "http" };
        format!("{}://{}", scheme, endpoint)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| StorageError::config(format!("invalid endpoint '{}': {}", endpoint, e)))?;
    if url.host_str().is_none() {
        return Err(StorageError::config(format!(
            "endpoint '{}' has no host",
            endpoint
        )));
    }
    Ok(url)
}

#[async_trait]
impl StorageService for S3Backend {
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
                    "S3-compatible storage initialized"
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
        self.core
            .remove(name)
            .await
            .inspect_err(|e| warn!(bucket = %self.core.bucket, key = %name, error = %e, "failed to delete object"))
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
            platform: "minio".to_string(),
            bucket: "b1".to_string(),
            region: "us-east-1".to_string(),
            public_path: "public".to_string(),
            endpoint: "local:9000".to_string(),
            access_id: "k".to_string(),
            secret_key: "s".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_endpoint_url() {
        let url = endpoint_url("local:9000", false).unwrap();
        assert_eq!(url.origin().ascii_serialization(), "http://local:9000");

        let url = endpoint_url("minio.internal/", true).unwrap();
        assert_eq!(url.origin().ascii_serialization(), "https://minio.internal");

        let url = endpoint_url("https://s3.amazonaws.com", false).unwrap();
        assert_eq!(url.scheme(), "https");

        assert!(endpoint_url("", false).is_err());
    }

    #[test]
    fn test_links() {
        let backend = S3Backend::new(&config(), "b1");
        let meta = ObjectMeta {
            key: "notes/x.txt".to_string(),
            size: 2,
            content_type: None,
            etag: None,
            last_modified: None,
        };
        let info = backend.info(meta);
        assert_eq!(info.self_link, "b1/notes/x.txt");
        assert_eq!(info.media_link, "/storage/b1/notes/x.txt");
    }

    #[tokio::test]
    async fn test_initialize_rejects_missing_fields() {
        let config = StorageConfig {
            secret_key: String::new(),
            ..config()
        };
        let client = Arc::new(MemoryClient::new());
        let backend = S3Backend::new(&config, "b1").with_client(client.clone());

        let err = backend.initialize().await.unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
        assert!(err.to_string().contains("secret_key"));
        assert_eq!(client.bucket_creations().await, 0);
    }

    #[tokio::test]
    async fn test_existing_bucket_keeps_policy() {
        let client = Arc::new(MemoryClient::with_bucket());
        let backend = S3Backend::new(&config(), "b1").with_client(client.clone());

        backend.initialize().await.unwrap();
        assert_eq!(client.bucket_creations().await, 0);
        assert!(client.bucket_policy().await.is_none());
    }

    #[tokio::test]
    async fn test_operations_before_initialize() {
        let backend = S3Backend::new(&config(), "b1").with_client(Arc::new(MemoryClient::new()));
        let err = backend.object_info("x").await.unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }
}
