//! Storage module for file management
//!
//! Provides the `Storage` trait and an S3-compatible implementation that
//! provisions its bucket on first use.

pub mod acl;
pub mod backend;
pub mod location;
mod s3_backend;
mod s3_storage;
pub mod traits;

pub use acl::AclPolicy;
pub use backend::{BucketConnector, ConnectionConfig, ListPage, ObjectBucket, ObjectMeta};
pub use location::Location;
pub use s3_backend::{S3Bucket, S3Connector};
pub use s3_storage::{S3Storage, StorageOptions};
pub use traits::{FileContent, ObjectNameStream, Storage, UrlOptions};
