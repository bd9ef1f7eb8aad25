//! Storage configuration loading and validation.
//!
//! Settings live in a JSON file (`db-config.json` by default) under a
//! `storage` section. When the `ENV` variable names a profile that exists
//! inside that section, the profile is used instead:
//!
//! ```json
//! {
//!   "storage": {
//!     "dev":  { "platform": "minio", "endpoint": "localhost:9000", ... },
//!     "prod": { "platform": "gcs", "service_account": "{...}", ... }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StorageError};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "db-config.json";
/// Overrides the config file location.
pub const CONFIG_FILE_ENV: &str = "CLOUDSTORE_CONFIG";
/// Selects the profile inside the `storage` section.
pub const PROFILE_ENV: &str = "ENV";
/// Dotenv file loaded into the process environment at startup.
pub const ENV_FILE: &str = "config.env";

const STORAGE_SECTION: &str = "storage";

/// Storage platform selected by the `platform` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    /// Google Cloud Storage.
    Gcs,
    /// MinIO.
    Minio,
    /// Any other value; treated as an S3-compatible service.
    Other(String),
}

impl Platform {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gcs" => Platform::Gcs,
            "minio" => Platform::Minio,
            other => Platform::Other(other.to_string()),
        }
    }

    /// Whether this platform is served by the S3-compatible backend.
    pub fn is_s3_compatible(&self) -> bool {
        !matches!(self, Platform::Gcs)
    }
}

/// The `storage` configuration consumed by the factory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub platform: String,
    pub bucket: String,
    pub region: String,
    pub public_path: String,
    pub endpoint: String,
    pub access_id: String,
    pub secret_key: String,
    /// Service-account key JSON (GCS only).
    pub service_account: String,
    pub project_id: String,
    /// Use TLS when the endpoint carries no scheme (S3-compatible only).
    pub use_ssl: bool,
}

impl StorageConfig {
    pub fn platform(&self) -> Platform {
        Platform::parse(&self.platform)
    }

    /// Check that every field the platform needs is present.
    pub fn validate(&self) -> Result<()> {
        let required: Vec<(&str, &str)> = match self.platform() {
            Platform::Gcs => vec![
                ("endpoint", self.endpoint.as_str()),
                ("service_account", self.service_account.as_str()),
                ("project_id", self.project_id.as_str()),
                ("region", self.region.as_str()),
                ("bucket", self.bucket.as_str()),
                ("public_path", self.public_path.as_str()),
            ],
            Platform::Minio | Platform::Other(_) => vec![
                ("endpoint", self.endpoint.as_str()),
                ("access_id", self.access_id.as_str()),
                ("secret_key", self.secret_key.as_str()),
                ("region", self.region.as_str()),
                ("bucket", self.bucket.as_str()),
                ("public_path", self.public_path.as_str()),
            ],
        };

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StorageError::config(format!(
                "storage config for platform '{}' is missing: {}",
                self.platform,
                missing.join(", ")
            )))
        }
    }

    /// Load from the default file, honoring `CLOUDSTORE_CONFIG` and `ENV`.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let profile = std::env::var(PROFILE_ENV).ok();
        Self::load_from(&path, profile.as_deref())
    }

    /// Load the `storage` section from `path`, optionally narrowed to `profile`.
    pub fn load_from(path: &Path, profile: Option<&str>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StorageError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content, profile).map_err(|e| match e {
            StorageError::Config(msg) => {
                StorageError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_json(content: &str, profile: Option<&str>) -> Result<Self> {
        let root: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| StorageError::config(format!("invalid JSON: {}", e)))?;

        let section = root
            .get(STORAGE_SECTION)
            .ok_or_else(|| StorageError::config("missing 'storage' section"))?;

        let selected = match profile.filter(|p| !p.is_empty()) {
            Some(name) => match section.get(name) {
                Some(profile_section) => profile_section,
                None => {
                    tracing::debug!(profile = name, "storage profile not found, using section root");
                    section
                }
            },
            None => section,
        };

        serde_json::from_value(selected.clone())
            .map_err(|e| StorageError::config(format!("invalid storage section: {}", e)))
    }
}

/// Load `config.env` from the working directory into the environment.
///
/// A missing file is not an error; the environment may already be set.
pub fn load_env_file() {
    match dotenvy::from_filename(ENV_FILE) {
        Ok(path) => tracing::info!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => tracing::debug!("no {} found, skipping", ENV_FILE),
        Err(e) => tracing::warn!("failed to load {}: {}", ENV_FILE, e),
    }
}
