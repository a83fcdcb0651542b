//! Storage abstraction trait
//!
//! This module defines the `Storage` trait the application talks to. Keys are
//! plain object names; no prefixing or renaming happens behind the caller's back.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncSeek};

use crate::core::error::Result as StorageResult;

/// Seekable byte source accepted by `Storage::save`
pub trait FileContent: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send + ?Sized> FileContent for T {}

/// Lazy, single-pass sequence of object names
pub type ObjectNameStream = BoxStream<'static, StorageResult<String>>;

/// Parameters for `Storage::url`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlOptions {
    /// Validity of the generated URL in seconds
    pub expires: u32,
    /// Sign the URL with query-string authentication
    pub query_auth: bool,
    /// Force a plain `http://` URL; `None` uses the storage default
    pub force_http: Option<bool>,
}

impl UrlOptions {
    pub const DEFAULT_EXPIRES_SECS: u32 = 30;

    pub fn signed(expires: u32) -> Self {
        Self {
            expires,
            query_auth: true,
            force_http: None,
        }
    }
}

impl Default for UrlOptions {
    fn default() -> Self {
        Self {
            expires: Self::DEFAULT_EXPIRES_SECS,
            query_auth: false,
            force_http: None,
        }
    }
}

/// File storage interface
///
/// Every operation awaits the remote store before returning. Nothing is
/// retried.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check whether an object with exactly this name exists
    async fn exists(&self, name: &str) -> StorageResult<bool>;

    /// Download the full object into an anonymous temporary file
    ///
    /// The returned file is positioned at the start and is not connected to
    /// the network.
    async fn open(&self, name: &str) -> StorageResult<tokio::fs::File>;

    /// Upload `content` under `name` and return the stored name
    async fn save(&self, name: &str, content: &mut dyn FileContent) -> StorageResult<String>;

    /// Delete the object; deleting a missing object is not an error
    async fn delete(&self, name: &str) -> StorageResult<()>;

    /// List the objects under `path`
    ///
    /// Returns `(directories, files)`. Directories are never reported
    /// separately, so the first element is always empty. The second element
    /// fetches pages from the store as it is polled.
    async fn listdir(&self, path: &str) -> StorageResult<(Vec<String>, ObjectNameStream)>;

    /// Size of the object in bytes
    async fn size(&self, name: &str) -> StorageResult<u64>;

    /// URL for retrieving the object
    async fn url(&self, name: &str, options: UrlOptions) -> StorageResult<String>;

    /// Name under which new content for `name` will be stored
    fn get_available_name(&self, name: &str) -> String;

    /// Last modification time in local time
    async fn modified_time(&self, name: &str) -> StorageResult<NaiveDateTime>;

    /// Same as `modified_time`; object stores keep a single timestamp
    async fn created_time(&self, name: &str) -> StorageResult<NaiveDateTime> {
        self.modified_time(name).await
    }

    /// Same as `modified_time`; object stores keep a single timestamp
    async fn accessed_time(&self, name: &str) -> StorageResult<NaiveDateTime> {
        self.modified_time(name).await
    }
}
