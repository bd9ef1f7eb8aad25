//! Unified object storage over Google Cloud Storage and S3-compatible
//! services.
//!
//! Configure a `storage` section, call [`init_storage_client`] once, then ask
//! [`new_client`] for a backend per bucket suffix. See [`storage`] for the
//! operations every backend supports.

pub mod config;
pub mod error;
pub mod logger;
pub mod storage;
pub mod timex;

pub use config::{Platform, StorageConfig};
pub use error::{Result, StorageError};
pub use storage::{
    BoxedStorageService, FileObject, ObjectInfo, StorageFactory, StorageService,
    init_storage_client, new_client,
};
