use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bucket provisioning error: {0}")]
    Provisioning(String),

    #[error("Bucket already exists: {0}")]
    AlreadyExists(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Generic I/O failure carrying only a message
    ///
    /// Upload failures, no-replace collisions and short uploads all surface
    /// through this; callers tell them apart by the message.
    pub fn io(message: impl Into<String>) -> Self {
        StorageError::Io(io::Error::other(message.into()))
    }

    /// Whether bucket creation may fall back to fetching the existing bucket
    pub fn is_bucket_fallback(&self) -> bool {
        matches!(
            self,
            StorageError::AlreadyExists(_) | StorageError::AccessDenied(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_message() {
        let err = StorageError::io("File already exists and can't be replaced - a.txt");

        match err {
            StorageError::Io(inner) => {
                assert_eq!(inner.kind(), io::ErrorKind::Other);
                assert_eq!(
                    inner.to_string(),
                    "File already exists and can't be replaced - a.txt"
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_bucket_fallback_classification() {
        assert!(StorageError::AlreadyExists("b".into()).is_bucket_fallback());
        assert!(StorageError::AccessDenied("b".into()).is_bucket_fallback());
        assert!(!StorageError::Provisioning("b".into()).is_bucket_fallback());
        assert!(!StorageError::Backend("b".into()).is_bucket_fallback());
    }
}
