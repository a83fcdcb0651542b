//! Object-store client seam
//!
//! `S3Storage` never talks to an SDK directly. It provisions a bucket handle
//! through a `BucketConnector` and performs every key operation through the
//! resulting `ObjectBucket`.

use async_trait::async_trait;

use crate::core::error::Result as StorageResult;
use crate::modules::storage::acl::AclPolicy;
use crate::modules::storage::location::Location;

/// Connection parameters resolved from options and settings
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub bucket_name: String,
    pub access_key: String,
    pub secret_key: String,
    /// Endpoint host, with or without a scheme
    pub host: String,
    pub location: Option<Location>,
    pub policy: AclPolicy,
}

impl ConnectionConfig {
    /// Endpoint URL; bare hosts default to https
    pub fn endpoint(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        }
    }

    pub fn signing_region(&self) -> &'static str {
        self.location
            .map(|location| location.signing_region())
            .unwrap_or(crate::modules::storage::location::DEFAULT_SIGNING_REGION)
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("bucket_name", &self.bucket_name)
            .field("access_key", &self.access_key)
            .field("host", &self.host)
            .field("location", &self.location)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Metadata returned by a key lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    /// Last-modified timestamp exactly as the store reported it
    pub last_modified: Option<String>,
}

/// One page of a prefix listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub names: Vec<String>,
    /// Token for the next page; `None` on the last page
    pub next_token: Option<String>,
}

/// Handle to one remote bucket
#[async_trait]
pub trait ObjectBucket: Send + Sync + 'static {
    /// Look a key up; `Ok(None)` when it does not exist
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMeta>>;

    /// Fetch the full object body; `NotFound` when missing
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Delete by key; a missing key is not an error
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn list_page(
        &self,
        prefix: &str,
        delimiter: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ListPage>;

    /// Plain or query-signed URL for the key
    async fn generate_url(&self, key: &str, expires: u32, query_auth: bool)
        -> StorageResult<String>;

    async fn set_acl(&self, key: &str, policy: AclPolicy) -> StorageResult<()>;
}

/// Provisions bucket handles
#[async_trait]
pub trait BucketConnector: Send + Sync {
    type Bucket: ObjectBucket;

    /// Create the bucket
    ///
    /// Must fail with `AlreadyExists` or `AccessDenied` when the bucket is
    /// already there or creation is not permitted, so the caller can fall
    /// back to `get_bucket`.
    async fn create_bucket(&self, config: &ConnectionConfig) -> StorageResult<Self::Bucket>;

    /// Fetch an existing bucket by name
    async fn get_bucket(&self, config: &ConnectionConfig) -> StorageResult<Self::Bucket>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> ConnectionConfig {
        ConnectionConfig {
            bucket_name: "media".to_string(),
            access_key: "key".to_string(),
            secret_key: "secret".to_string(),
            host: host.to_string(),
            location: None,
            policy: AclPolicy::PublicRead,
        }
    }

    #[test]
    fn test_endpoint_defaults_to_https() {
        assert_eq!(config("s3.amazonaws.com").endpoint(), "https://s3.amazonaws.com");
        assert_eq!(config("http://localhost:9000/").endpoint(), "http://localhost:9000");
    }

    #[test]
    fn test_signing_region() {
        let mut cfg = config("s3.amazonaws.com");
        assert_eq!(cfg.signing_region(), "us-east-1");

        cfg.location = Some(Location::APSoutheast2);
        assert_eq!(cfg.signing_region(), "ap-southeast-2");
    }

    #[test]
    fn test_debug_hides_secret() {
        assert!(!format!("{:?}", config("h")).contains("secret"));
    }
}
