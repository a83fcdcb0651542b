//! S3 bucket storage
//!
//! `S3Storage` implements `Storage` on top of a lazily provisioned bucket.
//! Configuration is resolved once at construction: explicit options first,
//! then process-wide settings.

use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime};
use futures::{stream, StreamExt, TryStreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::core::config::StorageSettings;
use crate::core::error::{Result, StorageError};
use crate::modules::storage::acl::AclPolicy;
use crate::modules::storage::backend::{BucketConnector, ConnectionConfig, ObjectBucket, ObjectMeta};
use crate::modules::storage::location::Location;
use crate::modules::storage::s3_backend::S3Connector;
use crate::modules::storage::traits::{FileContent, ObjectNameStream, Storage, UrlOptions};
use crate::shared::constants::{ADMIN_ASSET_PATH, LIST_DELIMITER, STORAGE_LABEL};

/// Per-instance overrides for `S3Storage`
///
/// Empty strings and `false` count as "not supplied" and fall back to
/// settings. `replace` is never taken from settings.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageOptions {
    pub bucket_name: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    /// Location name, e.g. `EU` or `APSoutheast2`
    pub location: Option<String>,
    pub host: Option<String>,
    /// Canned ACL, e.g. `public-read`
    pub policy: Option<String>,
    /// Overwrite existing objects on save
    pub replace: bool,
    pub force_http_url: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            bucket_name: None,
            key: None,
            secret: None,
            location: None,
            host: None,
            policy: None,
            replace: true,
            force_http_url: false,
        }
    }
}

impl StorageOptions {
    pub fn with_bucket(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: Some(bucket_name.into()),
            ..Self::default()
        }
    }
}

impl fmt::Debug for StorageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageOptions")
            .field("bucket_name", &self.bucket_name)
            .field("key", &self.key)
            .field("location", &self.location)
            .field("host", &self.host)
            .field("policy", &self.policy)
            .field("replace", &self.replace)
            .field("force_http_url", &self.force_http_url)
            .finish_non_exhaustive()
    }
}

/// First non-empty value
fn pick(explicit: Option<String>, fallback: Option<String>) -> Option<String> {
    explicit.filter(|v| !v.is_empty()).or(fallback)
}

/// File storage backed by one S3 bucket
pub struct S3Storage<C: BucketConnector = S3Connector> {
    connector: C,
    config: ConnectionConfig,
    replace: bool,
    force_http: bool,
    admin_base_url: String,
    bucket: OnceCell<Arc<C::Bucket>>,
}

impl S3Storage<S3Connector> {
    pub fn new(options: StorageOptions, settings: &StorageSettings) -> Result<Self> {
        Self::with_connector(S3Connector::new()?, options, settings)
    }

    /// Build from environment settings (`.env` is loaded first)
    pub fn from_env(options: StorageOptions) -> Result<Self> {
        let settings = StorageSettings::from_env().map_err(StorageError::Config)?;
        Self::new(options, &settings)
    }
}

impl<C: BucketConnector> S3Storage<C> {
    pub fn with_connector(
        connector: C,
        options: StorageOptions,
        settings: &StorageSettings,
    ) -> Result<Self> {
        let location = pick(options.location, settings.bucket_location.clone())
            .map(|name| name.parse::<Location>())
            .transpose()?;
        let policy = pick(options.policy, Some(settings.acl_policy.clone()))
            .unwrap_or_else(|| StorageSettings::DEFAULT_ACL_POLICY.to_string())
            .parse::<AclPolicy>()?;

        let config = ConnectionConfig {
            bucket_name: pick(options.bucket_name, settings.bucket_name.clone()).unwrap_or_default(),
            access_key: pick(options.key, settings.access_key.clone()).unwrap_or_default(),
            secret_key: pick(options.secret, settings.secret_key.clone()).unwrap_or_default(),
            host: pick(options.host, Some(settings.host.clone()))
                .unwrap_or_else(|| StorageSettings::DEFAULT_HOST.to_string()),
            location,
            policy,
        };

        Ok(Self {
            connector,
            config,
            replace: options.replace,
            force_http: options.force_http_url || settings.force_http_url,
            admin_base_url: settings.s3_url.clone(),
            bucket: OnceCell::new(),
        })
    }

    pub fn bucket_name(&self) -> &str {
        &self.config.bucket_name
    }

    pub fn access_key(&self) -> &str {
        &self.config.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.config.secret_key
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn location(&self) -> Option<Location> {
        self.config.location
    }

    pub fn policy(&self) -> AclPolicy {
        self.config.policy
    }

    pub fn replace(&self) -> bool {
        self.replace
    }

    pub fn force_http(&self) -> bool {
        self.force_http
    }

    /// Bucket handle, provisioned on first use
    ///
    /// A failed attempt is not cached; the next call tries again.
    async fn bucket(&self) -> Result<Arc<C::Bucket>> {
        self.bucket
            .get_or_try_init(|| self.provision())
            .await
            .cloned()
    }

    async fn provision(&self) -> Result<Arc<C::Bucket>> {
        match self.connector.create_bucket(&self.config).await {
            Ok(bucket) => Ok(Arc::new(bucket)),
            Err(e) if e.is_bucket_fallback() => {
                debug!(
                    "Could not create bucket '{}' ({}), fetching existing bucket",
                    self.config.bucket_name, e
                );
                self.connector
                    .get_bucket(&self.config)
                    .await
                    .map(Arc::new)
            }
            Err(e) => Err(e),
        }
    }

    async fn lookup(&self, name: &str) -> Result<ObjectMeta> {
        self.bucket()
            .await?
            .head(name)
            .await?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}

/// Read the whole content and put it under `name`
async fn upload<B, R>(bucket: &B, name: &str, content: &mut R) -> Result<()>
where
    B: ObjectBucket,
    R: AsyncRead + Unpin + ?Sized,
{
    let mut data = Vec::new();
    content.read_to_end(&mut data).await?;
    bucket.put(name, &data).await
}

/// Parse a store timestamp into naive local time
///
/// HEAD responses use RFC 2822 dates, listings use RFC 3339. A weekday that
/// disagrees with the date is ignored rather than rejected.
fn parse_last_modified(raw: &str) -> Result<NaiveDateTime> {
    let parsed = DateTime::parse_from_rfc2822(raw)
        .or_else(|_| {
            let undated = raw.split_once(", ").map_or(raw, |(_, rest)| rest);
            DateTime::parse_from_rfc2822(undated)
        })
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map_err(|e| {
            StorageError::Backend(format!("Invalid last-modified timestamp '{}': {}", raw, e))
        })?;

    Ok(parsed.with_timezone(&Local).naive_local())
}

fn force_plain_http(url: String) -> String {
    match url.strip_prefix("https://") {
        Some(rest) => format!("http://{}", rest),
        None => url,
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

struct Listing<B> {
    bucket: Arc<B>,
    prefix: String,
    cursor: Cursor,
}

async fn next_page<B: ObjectBucket>(
    mut listing: Listing<B>,
) -> Result<Option<(Vec<String>, Listing<B>)>> {
    let token = match std::mem::replace(&mut listing.cursor, Cursor::Done) {
        Cursor::Start => None,
        Cursor::Next(token) => Some(token),
        Cursor::Done => return Ok(None),
    };

    let page = listing
        .bucket
        .list_page(&listing.prefix, LIST_DELIMITER, token)
        .await?;
    if let Some(token) = page.next_token {
        listing.cursor = Cursor::Next(token);
    }

    Ok(Some((page.names, listing)))
}

#[async_trait]
impl<C: BucketConnector> Storage for S3Storage<C> {
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.bucket().await?.head(name).await?.is_some())
    }

    async fn open(&self, name: &str) -> Result<tokio::fs::File> {
        let data = self.bucket().await?.get(name).await?;

        let mut file = tokio::fs::File::from_std(tempfile::tempfile()?);
        file.write_all(&data).await?;
        file.flush().await?;
        file.seek(SeekFrom::Start(0)).await?;

        debug!("Opened '{}' ({} bytes)", name, data.len());
        Ok(file)
    }

    async fn save(&self, name: &str, content: &mut dyn FileContent) -> Result<String> {
        let bucket = self.bucket().await?;
        content.seek(SeekFrom::Start(0)).await?;

        if !self.replace && bucket.head(name).await?.is_some() {
            return Err(StorageError::io(format!(
                "File already exists and can't be replaced - {}",
                name
            )));
        }

        upload(bucket.as_ref(), name, content)
            .await
            .map_err(|e| StorageError::io(format!("Error during uploading file - {}", e)))?;

        let orig_size = content.seek(SeekFrom::End(0)).await?;
        let saved_size = bucket.head(name).await?.map(|meta| meta.size).unwrap_or(0);

        if saved_size != orig_size {
            warn!(
                "Saved {} of {} bytes for '{}', removing partial object",
                saved_size, orig_size, name
            );
            bucket.delete(name).await?;

            return Err(StorageError::io(format!(
                "Error during saving file {} - saved {} of {} bytes",
                name, saved_size, orig_size
            )));
        }

        bucket.set_acl(name, self.config.policy).await?;

        debug!(
            "Saved '{}' to bucket '{}' ({} bytes)",
            name, self.config.bucket_name, orig_size
        );
        Ok(name.to_string())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.bucket().await?.delete(name).await
    }

    async fn listdir(&self, path: &str) -> Result<(Vec<String>, ObjectNameStream)> {
        let listing = Listing {
            bucket: self.bucket().await?,
            prefix: path.to_string(),
            cursor: Cursor::Start,
        };

        let names = stream::try_unfold(listing, next_page::<C::Bucket>)
            .map_ok(|names| stream::iter(names.into_iter().map(Ok::<String, StorageError>)))
            .try_flatten()
            .boxed();

        Ok((Vec::new(), names))
    }

    async fn size(&self, name: &str) -> Result<u64> {
        Ok(self.lookup(name).await?.size)
    }

    async fn url(&self, name: &str, options: UrlOptions) -> Result<String> {
        if name == ADMIN_ASSET_PATH {
            return Ok(format!("{}{}", self.admin_base_url, ADMIN_ASSET_PATH));
        }

        // An explicit `false` still defers to the storage default
        let force_http = options.force_http.unwrap_or(false) || self.force_http;

        self.lookup(name).await?;
        let url = self
            .bucket()
            .await?
            .generate_url(name, options.expires, options.query_auth)
            .await?;

        Ok(if force_http { force_plain_http(url) } else { url })
    }

    fn get_available_name(&self, name: &str) -> String {
        name.to_string()
    }

    async fn modified_time(&self, name: &str) -> Result<NaiveDateTime> {
        let meta = self.lookup(name).await?;
        let raw = meta.last_modified.ok_or_else(|| {
            StorageError::Backend(format!("No last-modified timestamp for '{}'", name))
        })?;

        parse_last_modified(&raw)
    }
}

impl<C: BucketConnector> fmt::Display for S3Storage<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", STORAGE_LABEL, self.config.bucket_name)
    }
}

impl<C: BucketConnector> fmt::Debug for S3Storage<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Storage")
            .field("config", &self.config)
            .field("replace", &self.replace)
            .field("force_http", &self.force_http)
            .field("connected", &self.bucket.initialized())
            .finish_non_exhaustive()
    }
}
