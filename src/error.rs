//! Error types shared by every storage backend.

use std::time::Duration;

/// Errors returned by storage operations.
///
/// The variants follow how callers are expected to react: configuration
/// problems are fatal and never retried, a missing object is an ordinary
/// outcome, and transport failures carry the operation that failed.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Missing or invalid configuration, or a backend used before `initialize`.
    #[error("invalid storage configuration: {0}")]
    Config(String),

    /// The object or bucket does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Network or vendor failure, including timeouts.
    #[error("{op} failed: {message}")]
    Transport { op: &'static str, message: String },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn config(message: impl Into<String>) -> Self {
        StorageError::Config(message.into())
    }

    pub fn transport(op: &'static str, message: impl std::fmt::Display) -> Self {
        StorageError::Transport {
            op,
            message: message.to_string(),
        }
    }

    pub(crate) fn timeout(op: &'static str, after: Duration) -> Self {
        StorageError::Transport {
            op,
            message: format!("timed out after {:?}", after),
        }
    }

    /// Map an OpenDAL error, keeping "not found" distinguishable.
    pub(crate) fn from_opendal(op: &'static str, key: &str, err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::transport(op, err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::transport("http request", err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(err.to_string()),
            _ => StorageError::transport("io", err),
        }
    }
}

/// Run `fut` with a deadline, turning an elapsed timer into a transport error.
pub(crate) async fn with_timeout<T, F>(op: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::timeout(op, after)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = StorageError::transport("put object", "connection reset");
        assert_eq!(err.to_string(), "put object failed: connection reset");

        let err = StorageError::NotFound("a/b.txt".to_string());
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "object not found: a/b.txt");
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_elapses() {
        let result: Result<()> = with_timeout("slow op", Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(StorageError::Transport { op, message }) => {
                assert_eq!(op, "slow op");
                assert!(message.contains("timed out"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
