//! Object storage behind one interface.
//!
//! Callers hold a [`BoxedStorageService`] and never see which vendor serves
//! it. Two backends exist:
//!
//! - **Google Cloud Storage** for `platform = "gcs"`
//! - **S3-compatible** services (MinIO, AWS S3, ...) for every other platform
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    StorageFactory                           │
//! │  - Validates the `storage` config once per process          │
//! │  - Builds and initializes a backend per bucket suffix       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │   GcsBackend             │   │   S3Backend              │
//! │   (bucket auto-create)   │   │   (create + public read) │
//! └──────────────────────────┘   └──────────────────────────┘
//!              │                               │
//!              └───────────────┬───────────────┘
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ObjectClient                             │
//! │  - OpenDAL operator for objects                             │
//! │  - Vendor REST calls for bucket administration              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bulk operations (`delete_path`, `copy_path`, `rename_folder`) run as
//! concurrent pipelines and are not atomic: a failure part way leaves the
//! work already done in place.
//!
//! # Example
//!
//! ```ignore
//! use cloudstore::storage::{init_storage_client, new_client};
//!
//! init_storage_client().await?;
//! let storage = new_client("").await?;
//!
//! let reader = Box::pin(futures::io::Cursor::new(b"hi".to_vec()));
//! let info = storage.save_object(reader, "notes/x.txt", "text/plain").await?;
//! println!("{} ({} bytes)", info.name, info.size);
//! ```

mod backend;
mod bulk;
mod factory;
pub mod gcs;
pub mod memory;
mod opendal_client;
pub mod paths;
pub mod s3;
mod traits;
mod types;

pub use factory::{StorageFactory, init_storage_client, new_client};
pub use gcs::GcsBackend;
pub use memory::MemoryClient;
pub use paths::generate_object_name;
pub use s3::{S3Backend, public_read_policy};
pub use traits::{BoxedStorageService, BucketAdmin, ObjectClient, StorageService};
pub use types::{
    FileObject, ListedObject, ObjectInfo, ObjectMeta, ObjectReader, SHARED_URL_TTL, Timeouts,
};
