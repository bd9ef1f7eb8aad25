//! Storage traits.
//!
//! [`StorageService`] is the capability set callers program against. Both
//! backends implement it identically apart from the per-operation differences
//! noted below.
//!
//! [`ObjectClient`] and [`BucketAdmin`] are the vendor seams underneath: the
//! raw calls a backend needs from a vendor, kept small enough that an
//! in-memory implementation can stand in for tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

use super::types::{FileObject, ListedObject, ObjectInfo, ObjectMeta, ObjectReader};
use crate::error::Result;

/// Uniform object-storage operations over one bucket.
///
/// Every operation except the accessors needs [`initialize`] to have
/// succeeded first and fails with `StorageError::Config` otherwise.
///
/// Bulk operations (`delete_bucket`, `delete_path`, `copy_path`,
/// `rename_folder`) are not transactional. A failure partway through is
/// reported as the first error encountered; objects already deleted or
/// copied stay that way.
///
/// [`initialize`]: StorageService::initialize
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Build the vendor client and make sure the bucket exists.
    ///
    /// Idempotent: once it has succeeded, later calls return `Ok` without
    /// touching the vendor. Concurrent first calls initialize once.
    async fn initialize(&self) -> Result<()>;

    /// Store `reader` under a generated name derived from `path_hint`.
    ///
    /// The name keeps the hint's directory and prefixes the file name with a
    /// microsecond timestamp, e.g. `notes/20240309140507000042_x.txt`.
    async fn save_object(
        &self,
        reader: ObjectReader,
        path_hint: &str,
        content_type: &str,
    ) -> Result<ObjectInfo>;

    /// Like [`save_object`](StorageService::save_object), with the name placed
    /// under the public path.
    async fn save_public_object(
        &self,
        reader: ObjectReader,
        path_hint: &str,
        content_type: &str,
    ) -> Result<ObjectInfo>;

    /// Server-side copy within the bucket. `NotFound` if `src` is absent.
    async fn copy_object(&self, src: &str, dst: &str) -> Result<ObjectInfo>;

    /// Open an object for reading. `NotFound` if absent.
    async fn get_object(&self, name: &str) -> Result<FileObject>;

    /// Remove one object.
    ///
    /// The S3-compatible backend treats a missing object as success; the
    /// cloud-bucket backend returns `NotFound`.
    async fn delete_object(&self, name: &str) -> Result<()>;

    /// Remove every object, then the bucket itself.
    async fn delete_bucket(&self) -> Result<()>;

    /// Remove everything under `{public_path}/{prefix}` and under `{prefix}`.
    ///
    /// Returns the summed size of the deleted objects. A key found by both
    /// scans is deleted and counted once.
    async fn delete_path(&self, prefix: &str) -> Result<u64>;

    /// Stat an object without reading it. `NotFound` if absent.
    async fn object_info(&self, name: &str) -> Result<ObjectInfo>;

    /// Pre-signed GET URL for one object, valid for 24 hours.
    async fn shared_url(&self, name: &str) -> Result<String>;

    /// Keys starting with `prefix`, in listing order.
    ///
    /// With `recursive == false` only the entries directly under the prefix's
    /// directory are returned, with deeper levels folded into sub-prefixes
    /// ending in `/`.
    async fn list_objects(&self, prefix: &str, recursive: bool) -> Result<Vec<String>>;

    /// Summed size of the objects [`list_objects`](StorageService::list_objects)
    /// would return.
    async fn folder_size(&self, prefix: &str, recursive: bool) -> Result<u64>;

    /// Copy every listed object under `src` to the key obtained by replacing
    /// the first occurrence of `src` with `dst`. Returns bytes copied.
    ///
    /// The replacement is a literal substring match, not segment-aware.
    async fn copy_path(&self, src: &str, dst: &str, recursive: bool) -> Result<u64>;

    /// Copy everything under `src` as `copy_path` does, then delete the
    /// originals.
    async fn rename_folder(&self, src: &str, dst: &str) -> Result<()>;

    fn bucket_name(&self) -> &str;

    fn public_path(&self) -> &str;

    fn region(&self) -> &str;

    fn endpoint(&self) -> &str;
}

/// Boxed storage service, as returned by the factory.
pub type BoxedStorageService = Box<dyn StorageService>;

/// Raw vendor calls against one bucket.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn bucket_exists(&self) -> Result<bool>;

    /// Create the bucket in `region`. Succeeds if the caller already owns it.
    async fn create_bucket(&self, region: &str) -> Result<()>;

    /// Replace the bucket policy with `policy` (a JSON document).
    async fn put_bucket_policy(&self, policy: &str) -> Result<()>;

    /// Remove the bucket. It must be empty.
    async fn delete_bucket(&self) -> Result<()>;

    /// Write the full content of `reader` to `key`.
    ///
    /// The returned size is the number of bytes read from `reader`.
    async fn put_object(
        &self,
        key: &str,
        reader: ObjectReader,
        content_type: Option<&str>,
    ) -> Result<ObjectMeta>;

    async fn get_object(&self, key: &str) -> Result<(ObjectReader, ObjectMeta)>;

    async fn stat_object(&self, key: &str) -> Result<ObjectMeta>;

    async fn copy_object(&self, src: &str, dst: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Stream the entries whose key starts with `prefix`.
    fn list_objects(&self, prefix: &str, recursive: bool)
    -> BoxStream<'static, Result<ListedObject>>;

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String>;
}

/// Bucket-level calls that the object API does not cover.
#[async_trait]
pub trait BucketAdmin: Send + Sync {
    async fn exists(&self) -> Result<bool>;

    /// Create the bucket. Succeeds if the caller already owns it.
    async fn create(&self, region: &str) -> Result<()>;

    async fn put_policy(&self, policy: &str) -> Result<()>;

    async fn delete(&self) -> Result<()>;
}
