//! State and operations shared by the S3-compatible and cloud-bucket backends.
//!
//! A backend is a [`BackendCore`] plus its vendor-specific parts: how the
//! client is built, how the bucket is ensured, how delete-of-missing behaves
//! and how locators are formatted.

use async_lock::OnceCell;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error};

use super::bulk;
use super::paths;
use super::traits::ObjectClient;
use super::types::{ObjectInfo, ObjectMeta, ObjectReader, SHARED_URL_TTL, Timeouts};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError, with_timeout};

pub(crate) struct BackendCore {
    pub(crate) bucket: String,
    pub(crate) public_path: String,
    pub(crate) region: String,
    pub(crate) endpoint: String,
    pub(crate) timeouts: Timeouts,
    /// Client to use instead of building a vendor one.
    pub(crate) prebuilt: Option<Arc<dyn ObjectClient>>,
    pub(crate) client: OnceCell<Arc<dyn ObjectClient>>,
}

impl BackendCore {
    pub(crate) fn new(config: &StorageConfig, bucket: String, timeouts: Timeouts) -> Self {
        Self {
            bucket,
            public_path: config.public_path.trim_matches('/').to_string(),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
            timeouts,
            prebuilt: None,
            client: OnceCell::new(),
        }
    }

    /// The initialized client, or a `Config` error before `initialize`.
    pub(crate) fn client(&self) -> Result<&dyn ObjectClient> {
        self.client.get().map(|client| client.as_ref()).ok_or_else(|| {
            StorageError::config(format!(
                "storage backend for bucket '{}' used before initialize",
                self.bucket
            ))
        })
    }

    pub(crate) fn public_name(&self, name: &str) -> String {
        paths::join_key(&[&self.public_path, name])
    }

    pub(crate) fn info(&self, meta: ObjectMeta, self_link: String, media_link: String) -> ObjectInfo {
        ObjectInfo {
            name: meta.key,
            self_link,
            media_link,
            content_type: meta.content_type,
            size: meta.size,
            etag: meta.etag,
            last_modified: meta.last_modified.unwrap_or_else(chrono::Utc::now),
        }
    }

    pub(crate) async fn put(
        &self,
        name: &str,
        reader: ObjectReader,
        content_type: &str,
    ) -> Result<ObjectMeta> {
        let client = self.client()?;
        let content_type = (!content_type.is_empty()).then_some(content_type);

        debug!(bucket = %self.bucket, key = %name, "PUT object");
        let mut meta = with_timeout(
            "put object",
            self.timeouts.object,
            client.put_object(name, reader, content_type),
        )
        .await
        .inspect_err(|e| error!(bucket = %self.bucket, key = %name, error = %e, "failed to write object"))?;

        if meta.content_type.is_none() {
            meta.content_type = content_type.map(str::to_string);
        }
        Ok(meta)
    }

    pub(crate) async fn copy(&self, src: &str, dst: &str) -> Result<ObjectMeta> {
        let client = self.client()?;

        debug!(bucket = %self.bucket, from = %src, to = %dst, "COPY object");
        with_timeout(
            "copy object",
            self.timeouts.object,
            client.copy_object(src, dst),
        )
        .await
        .inspect_err(|e| error!(bucket = %self.bucket, from = %src, to = %dst, error = %e, "failed to copy object"))?;

        self.stat(dst).await
    }

    pub(crate) async fn open(&self, name: &str) -> Result<(ObjectReader, ObjectMeta)> {
        let client = self.client()?;
        debug!(bucket = %self.bucket, key = %name, "GET object");
        with_timeout("get object", self.timeouts.object, client.get_object(name)).await
    }

    pub(crate) async fn stat(&self, name: &str) -> Result<ObjectMeta> {
        let client = self.client()?;
        debug!(bucket = %self.bucket, key = %name, "STAT object");
        with_timeout("stat object", self.timeouts.object, client.stat_object(name)).await
    }

    pub(crate) async fn remove(&self, name: &str) -> Result<()> {
        let client = self.client()?;
        debug!(bucket = %self.bucket, key = %name, "DELETE object");
        with_timeout(
            "delete object",
            self.timeouts.object,
            client.delete_object(name),
        )
        .await
    }

    pub(crate) async fn presign(&self, name: &str) -> Result<String> {
        let client = self.client()?;
        with_timeout(
            "presign object",
            self.timeouts.object,
            client.presign_get(name, SHARED_URL_TTL),
        )
        .await
    }

    pub(crate) async fn list_keys(&self, prefix: &str, recursive: bool) -> Result<Vec<String>> {
        let client = self.client()?;
        let entries =
            bulk::collect_listing(client, prefix, recursive, self.timeouts.object).await?;
        Ok(entries.into_iter().map(|entry| entry.key).collect())
    }

    pub(crate) async fn folder_size(&self, prefix: &str, recursive: bool) -> Result<u64> {
        let client = self.client()?;
        let entries =
            bulk::collect_listing(client, prefix, recursive, self.timeouts.object).await?;
        Ok(entries
            .iter()
            .filter(|entry| !entry.is_prefix)
            .map(|entry| entry.size)
            .sum())
    }

    pub(crate) async fn copy_path(&self, src: &str, dst: &str, recursive: bool) -> Result<u64> {
        let client = self.client()?;
        let copied = bulk::copy_prefix(client, src, dst, recursive, self.timeouts.object).await?;
        let total = copied.iter().map(|entry| entry.size).sum();
        debug!(bucket = %self.bucket, src, dst, objects = copied.len(), bytes = total, "copied path");
        Ok(total)
    }

    pub(crate) async fn rename_folder(&self, src: &str, dst: &str) -> Result<()> {
        let client = self.client()?;
        let copied = bulk::copy_prefix(client, src, dst, true, self.timeouts.object).await?;
        let count = copied.len();
        bulk::delete_all(
            client,
            stream::iter(copied.into_iter().map(Ok)),
            self.timeouts.object,
        )
        .await?;
        debug!(bucket = %self.bucket, src, dst, objects = count, "renamed folder");
        Ok(())
    }

    pub(crate) async fn delete_path(&self, prefix: &str) -> Result<u64> {
        let client = self.client()?;
        let public = bulk::list_files(client, &self.public_name(prefix), true);
        let private = bulk::list_files(client, &paths::join_key(&[prefix]), true);

        let total = bulk::delete_all(client, public.chain(private), self.timeouts.object).await?;
        debug!(bucket = %self.bucket, prefix, bytes = total, "deleted path");
        Ok(total)
    }

    /// Empty the bucket, then remove it.
    pub(crate) async fn delete_bucket(&self) -> Result<()> {
        let client = self.client()?;
        let everything = bulk::list_files(client, "", true);
        bulk::delete_all(client, everything, self.timeouts.object).await?;

        with_timeout("delete bucket", self.timeouts.bucket, client.delete_bucket())
            .await
            .inspect_err(|e| error!(bucket = %self.bucket, error = %e, "failed to delete bucket"))?;
        tracing::info!(bucket = %self.bucket, "bucket deleted");
        Ok(())
    }
}
