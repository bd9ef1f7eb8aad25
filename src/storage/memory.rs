//! In-memory object client for tests and local development.
//!
//! Behaves like an S3-style bucket: objects live in a sorted map, the bucket
//! has to be created before use and has to be empty before it can be removed.
//! A few inspection hooks (`bucket_creations`, `bucket_policy`, ...) and
//! injectable delete failures make backend behavior observable in tests.

use async_lock::RwLock;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::{AsyncReadExt, StreamExt};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::paths;
use super::traits::ObjectClient;
use super::types::{ListedObject, ObjectMeta, ObjectReader};
use crate::error::{Result, StorageError};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn meta(&self, key: &str) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size: self.data.len() as u64,
            content_type: self.content_type.clone(),
            etag: Some(self.etag.clone()),
            last_modified: Some(self.last_modified),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    bucket_exists: bool,
    bucket_creations: usize,
    policy: Option<String>,
    objects: BTreeMap<String, StoredObject>,
    failing_deletes: HashSet<String>,
}

/// Object client backed by a map in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryClient {
    /// A client whose bucket does not exist yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose bucket already exists.
    pub fn with_bucket() -> Self {
        let state = MemoryState {
            bucket_exists: true,
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn bucket_exists_now(&self) -> bool {
        self.state.read().await.bucket_exists
    }

    /// Number of successful `create_bucket` calls.
    pub async fn bucket_creations(&self) -> usize {
        self.state.read().await.bucket_creations
    }

    pub async fn bucket_policy(&self) -> Option<String> {
        self.state.read().await.policy.clone()
    }

    /// All stored keys in order.
    pub async fn keys(&self) -> Vec<String> {
        self.state.read().await.objects.keys().cloned().collect()
    }

    /// Raw content of `key`, if present.
    pub async fn content(&self, key: &str) -> Option<Bytes> {
        self.state.read().await.objects.get(key).map(|o| o.data.clone())
    }

    /// Store an object directly, bypassing naming rules.
    pub async fn insert(&self, key: &str, data: impl Into<Bytes>) {
        let mut state = self.state.write().await;
        state
            .objects
            .insert(key.to_string(), stored(data.into(), None));
    }

    /// Make every later delete of `key` fail.
    pub async fn fail_deletes_for(&self, key: &str) {
        let mut state = self.state.write().await;
        state.failing_deletes.insert(key.to_string());
    }
}

fn stored(data: Bytes, content_type: Option<String>) -> StoredObject {
    StoredObject {
        etag: hex::encode(Sha256::digest(&data)),
        data,
        content_type,
        last_modified: Utc::now(),
    }
}

fn no_bucket() -> StorageError {
    StorageError::NotFound("bucket".to_string())
}

#[async_trait]
impl ObjectClient for MemoryClient {
    async fn bucket_exists(&self) -> Result<bool> {
        Ok(self.state.read().await.bucket_exists)
    }

    async fn create_bucket(&self, _region: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.bucket_exists = true;
        state.bucket_creations += 1;
        Ok(())
    }

    async fn put_bucket_policy(&self, policy: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.bucket_exists {
            return Err(no_bucket());
        }
        state.policy = Some(policy.to_string());
        Ok(())
    }

    async fn delete_bucket(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.bucket_exists {
            return Err(no_bucket());
        }
        if !state.objects.is_empty() {
            return Err(StorageError::transport(
                "delete bucket",
                format!("bucket not empty ({} objects)", state.objects.len()),
            ));
        }
        state.bucket_exists = false;
        state.policy = None;
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        mut reader: ObjectReader,
        content_type: Option<&str>,
    ) -> Result<ObjectMeta> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;

        let mut state = self.state.write().await;
        if !state.bucket_exists {
            return Err(no_bucket());
        }
        let object = stored(Bytes::from(buf), content_type.map(str::to_string));
        let meta = object.meta(key);
        state.objects.insert(key.to_string(), object);
        Ok(meta)
    }

    async fn get_object(&self, key: &str) -> Result<(ObjectReader, ObjectMeta)> {
        let state = self.state.read().await;
        let object = state
            .objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        let reader: ObjectReader = Box::pin(futures::io::Cursor::new(object.data.clone()));
        Ok((reader, object.meta(key)))
    }

    async fn stat_object(&self, key: &str) -> Result<ObjectMeta> {
        let state = self.state.read().await;
        state
            .objects
            .get(key)
            .map(|object| object.meta(key))
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn copy_object(&self, src: &str, dst: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let source = state
            .objects
            .get(src)
            .ok_or_else(|| StorageError::NotFound(src.to_string()))?;
        let copy = stored(source.data.clone(), source.content_type.clone());
        state.objects.insert(dst.to_string(), copy);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.failing_deletes.contains(key) {
            return Err(StorageError::transport(
                "delete object",
                format!("injected failure for {}", key),
            ));
        }
        state.objects.remove(key);
        Ok(())
    }

    fn list_objects(
        &self,
        prefix: &str,
        recursive: bool,
    ) -> BoxStream<'static, Result<ListedObject>> {
        let state = self.state.clone();
        let prefix = prefix.to_string();

        stream::once(async move {
            let state = state.read().await;
            if !state.bucket_exists {
                return vec![Err(no_bucket())];
            }

            let matching = state
                .objects
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix));

            if recursive {
                return matching
                    .map(|(key, object)| Ok(ListedObject::object(key, object.data.len() as u64)))
                    .collect();
            }

            let dir = paths::list_dir(&prefix);
            let mut entries: Vec<Result<ListedObject>> = Vec::new();
            let mut last_prefix: Option<&str> = None;
            for (key, object) in matching {
                match paths::direct_child(dir, key) {
                    Some((child, true)) => {
                        if last_prefix != Some(child) {
                            entries.push(Ok(ListedObject::prefix(child)));
                            last_prefix = Some(child);
                        }
                    }
                    Some((child, false)) => {
                        entries.push(Ok(ListedObject::object(child, object.data.len() as u64)));
                    }
                    None => {}
                }
            }
            entries
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        let state = self.state.read().await;
        if !state.objects.contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!(
            "memory:///{}?expires={}",
            urlencoding::encode(key),
            expires_in.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn reader(data: &'static [u8]) -> ObjectReader {
        Box::pin(futures::io::Cursor::new(data))
    }

    async fn listing(client: &MemoryClient, prefix: &str, recursive: bool) -> Vec<ListedObject> {
        client
            .list_objects(prefix, recursive)
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_requires_bucket() {
        let client = MemoryClient::new();
        let err = client
            .put_object("a.txt", reader(b"hi"), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        client.create_bucket("us-east-1").await.unwrap();
        let meta = client
            .put_object("a.txt", reader(b"hi"), Some("text/plain"))
            .await
            .unwrap();
        assert_eq!(meta.size, 2);
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
        assert_eq!(client.bucket_creations().await, 1);
    }

    #[tokio::test]
    async fn test_get_and_copy() {
        let client = MemoryClient::with_bucket();
        client.insert("src.bin", &b"payload"[..]).await;

        client.copy_object("src.bin", "dst.bin").await.unwrap();
        let (mut stream, meta) = client.get_object("dst.bin").await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"payload");
        assert_eq!(meta.size, 7);

        let err = client.copy_object("missing", "x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let client = MemoryClient::with_bucket();
        client.delete_object("nothing-here").await.unwrap();

        client.insert("x", &b"1"[..]).await;
        client.fail_deletes_for("x").await;
        assert!(client.delete_object("x").await.is_err());
        assert_eq!(client.keys().await, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_list_recursive_and_delimited() {
        let client = MemoryClient::with_bucket();
        for key in ["a/1.txt", "a/b/2.txt", "a/b/3.txt", "a/c/4.txt", "ab.txt", "z.txt"] {
            client.insert(key, &b"xx"[..]).await;
        }

        let keys: Vec<String> = listing(&client, "a", true)
            .await
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, ["a/1.txt", "a/b/2.txt", "a/b/3.txt", "a/c/4.txt", "ab.txt"]);

        let flat = listing(&client, "a/", false).await;
        assert_eq!(
            flat,
            vec![
                ListedObject::object("a/1.txt", 2),
                ListedObject::prefix("a/b/"),
                ListedObject::prefix("a/c/"),
            ]
        );

        let top = listing(&client, "", false).await;
        assert_eq!(
            top,
            vec![
                ListedObject::prefix("a/"),
                ListedObject::object("ab.txt", 2),
                ListedObject::object("z.txt", 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_bucket_requires_empty() {
        let client = MemoryClient::with_bucket();
        client.insert("x", &b"1"[..]).await;
        assert!(client.delete_bucket().await.is_err());

        client.delete_object("x").await.unwrap();
        client.delete_bucket().await.unwrap();
        assert!(!client.bucket_exists_now().await);
    }

    #[tokio::test]
    async fn test_presign() {
        let client = MemoryClient::with_bucket();
        client.insert("a b.txt", &b"1"[..]).await;
        let url = client
            .presign_get("a b.txt", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(url, "memory:///a%20b.txt?expires=60");
        assert!(client.presign_get("nope", Duration::from_secs(60)).await.is_err());
    }
}
