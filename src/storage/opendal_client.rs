//! Object client over an OpenDAL operator.
//!
//! Object calls go through the operator, bucket calls through a
//! [`BucketAdmin`] since OpenDAL works inside an existing bucket.

use async_trait::async_trait;
use futures::AsyncReadExt;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use opendal::layers::LoggingLayer;
use opendal::{Builder, Entry, Metadata, Operator, Writer};
use std::time::Duration;
use tracing::warn;

use super::paths;
use super::traits::{BucketAdmin, ObjectClient};
use super::types::{ListedObject, ObjectMeta, ObjectReader};
use crate::error::{Result, StorageError};

/// Upload part size for streamed writes.
const WRITE_CHUNK_SIZE: usize = 8 * 1024 * 1024;
const READ_BUFFER_SIZE: usize = 64 * 1024;

pub(crate) struct OpendalClient {
    operator: Operator,
    admin: Box<dyn BucketAdmin>,
}

impl OpendalClient {
    pub(crate) fn new(operator: Operator, admin: Box<dyn BucketAdmin>) -> Self {
        Self { operator, admin }
    }
}

/// Finish an OpenDAL builder into an operator with logging.
pub(crate) fn build_operator<B: Builder>(builder: B) -> Result<Operator> {
    let operator = Operator::new(builder)
        .map_err(|e| StorageError::config(format!("failed to build storage operator: {}", e)))?
        .layer(LoggingLayer::default())
        .finish();
    Ok(operator)
}

fn object_meta(key: &str, metadata: &Metadata) -> ObjectMeta {
    ObjectMeta {
        key: key.to_string(),
        size: metadata.content_length(),
        content_type: metadata.content_type().map(str::to_string),
        etag: metadata.etag().map(|etag| etag.trim_matches('"').to_string()),
        last_modified: metadata.last_modified(),
    }
}

/// Stream `reader` into `writer`, returning the bytes written.
async fn copy_into(key: &str, mut reader: ObjectReader, writer: &mut Writer) -> Result<u64> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            return Ok(written);
        }
        writer
            .write(buf[..read].to_vec())
            .await
            .map_err(|e| StorageError::from_opendal("put object", key, e))?;
        written += read as u64;
    }
}

/// Convert one listing entry, dropping the listed directory itself, entries
/// outside `prefix`, and directories in recursive listings.
async fn listed_entry(
    operator: &Operator,
    prefix: &str,
    dir: &str,
    recursive: bool,
    entry: Entry,
) -> Result<Option<ListedObject>> {
    let path = entry.path();
    if path == dir || !path.starts_with(prefix) {
        return Ok(None);
    }
    if entry.metadata().is_dir() {
        return Ok((!recursive).then(|| ListedObject::prefix(path)));
    }

    let mut size = entry.metadata().content_length();
    if size == 0 {
        // Some services leave the length out of listings.
        size = operator
            .stat(path)
            .await
            .map_err(|e| StorageError::from_opendal("stat object", path, e))?
            .content_length();
    }
    Ok(Some(ListedObject::object(path, size)))
}

#[async_trait]
impl ObjectClient for OpendalClient {
    async fn bucket_exists(&self) -> Result<bool> {
        self.admin.exists().await
    }

    async fn create_bucket(&self, region: &str) -> Result<()> {
        self.admin.create(region).await
    }

    async fn put_bucket_policy(&self, policy: &str) -> Result<()> {
        self.admin.put_policy(policy).await
    }

    async fn delete_bucket(&self) -> Result<()> {
        self.admin.delete().await
    }

    async fn put_object(
        &self,
        key: &str,
        reader: ObjectReader,
        content_type: Option<&str>,
    ) -> Result<ObjectMeta> {
        let mut request = self.operator.writer_with(key).chunk(WRITE_CHUNK_SIZE);
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        let mut writer = request
            .await
            .map_err(|e| StorageError::from_opendal("put object", key, e))?;

        let written = match copy_into(key, reader, &mut writer).await {
            Ok(written) => written,
            Err(e) => {
                // Drop the parts uploaded so far.
                if let Err(abort) = writer.abort().await {
                    warn!(key = %key, error = %abort, "failed to abort partial upload");
                }
                return Err(e);
            }
        };
        writer
            .close()
            .await
            .map_err(|e| StorageError::from_opendal("put object", key, e))?;

        let mut meta = self.stat_object(key).await?;
        meta.size = written;
        if meta.content_type.is_none() {
            meta.content_type = content_type.map(str::to_string);
        }
        Ok(meta)
    }

    async fn get_object(&self, key: &str) -> Result<(ObjectReader, ObjectMeta)> {
        let meta = self.stat_object(key).await?;
        let reader = self
            .operator
            .reader(key)
            .await
            .map_err(|e| StorageError::from_opendal("get object", key, e))?
            .into_futures_async_read(0..meta.size)
            .await
            .map_err(|e| StorageError::from_opendal("get object", key, e))?;
        Ok((Box::pin(reader), meta))
    }

    async fn stat_object(&self, key: &str) -> Result<ObjectMeta> {
        let metadata = self
            .operator
            .stat(key)
            .await
            .map_err(|e| StorageError::from_opendal("stat object", key, e))?;
        Ok(object_meta(key, &metadata))
    }

    async fn copy_object(&self, src: &str, dst: &str) -> Result<()> {
        self.operator
            .copy(src, dst)
            .await
            .map_err(|e| StorageError::from_opendal("copy object", src, e))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.operator
            .delete(key)
            .await
            .map_err(|e| StorageError::from_opendal("delete object", key, e))
    }

    fn list_objects(
        &self,
        prefix: &str,
        recursive: bool,
    ) -> BoxStream<'static, Result<ListedObject>> {
        let prefix = prefix.to_string();
        let dir = match paths::list_dir(&prefix) {
            "" => "/".to_string(),
            dir => dir.to_string(),
        };

        let opened = {
            let operator = self.operator.clone();
            let dir = dir.clone();
            async move {
                operator
                    .lister_with(&dir)
                    .recursive(recursive)
                    .await
                    .map(|lister| {
                        lister.map_err(|e| StorageError::from_opendal("list objects", "", e))
                    })
                    .map_err(|e| StorageError::from_opendal("list objects", &dir, e))
            }
        };

        let operator = self.operator.clone();
        stream::once(opened)
            .try_flatten()
            .try_filter_map(move |entry| {
                let operator = operator.clone();
                let prefix = prefix.clone();
                let dir = dir.clone();
                async move { listed_entry(&operator, &prefix, &dir, recursive, entry).await }
            })
            .boxed()
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        let request = self
            .operator
            .presign_read(key, expires_in)
            .await
            .map_err(|e| StorageError::from_opendal("presign object", key, e))?;
        Ok(request.uri().to_string())
    }
}
