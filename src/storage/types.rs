//! Storage types.
//!
//! This module defines the entities returned by storage operations and the
//! small value types shared by both backends.

use chrono::{DateTime, Utc};
use futures::AsyncRead;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

/// A readable object stream. Dropping it closes it.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Information about a stored object, captured right after the operation
/// that produced it. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key within the bucket.
    pub name: String,
    /// Backend-specific locator used by clients.
    pub self_link: String,
    /// Download locator handed to consuming systems (`/storage/...`).
    pub media_link: String,
    /// MIME type.
    pub content_type: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Backend fingerprint; opaque and not comparable across backends.
    pub etag: Option<String>,
    /// Last write time.
    pub last_modified: DateTime<Utc>,
}

impl ObjectInfo {
    /// Final path segment of the object name.
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// An object's content stream together with its info.
///
/// The caller owns `reader` and closes it by dropping it.
pub struct FileObject {
    pub reader: ObjectReader,
    pub info: ObjectInfo,
}

impl fmt::Debug for FileObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileObject")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Object metadata as reported by the vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    /// Size in bytes, zero for prefixes.
    pub size: u64,
    /// True for a common prefix (a "folder") in a non-recursive listing.
    pub is_prefix: bool,
}

impl ListedObject {
    pub fn object(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            is_prefix: false,
        }
    }

    pub fn prefix(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: 0,
            is_prefix: true,
        }
    }
}

/// Per-call deadlines applied by the backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bucket-level calls (existence check, creation, policy, removal).
    pub bucket: Duration,
    /// Object-level calls (read, write, copy, list, delete).
    pub object: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            bucket: Duration::from_secs(10),
            object: Duration::from_secs(5 * 60),
        }
    }
}

/// Validity window of shared URLs.
pub const SHARED_URL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.bucket, Duration::from_secs(10));
        assert_eq!(timeouts.object, Duration::from_secs(300));
    }

    #[test]
    fn test_object_info_file_name() {
        let info = ObjectInfo {
            name: "public/notes/20240309140507000042_x.txt".to_string(),
            self_link: String::new(),
            media_link: String::new(),
            content_type: None,
            size: 0,
            etag: None,
            last_modified: Utc::now(),
        };
        assert_eq!(info.file_name(), "20240309140507000042_x.txt");
    }

    #[test]
    fn test_listed_object_constructors() {
        assert!(!ListedObject::object("a", 3).is_prefix);
        let folder = ListedObject::prefix("a/");
        assert!(folder.is_prefix);
        assert_eq!(folder.size, 0);
    }
}
