//! S3-compatible bucket handle backed by the rust-s3 crate
//!
//! rust-s3 covers every object operation except object ACLs, so those are
//! sent as `PUT ?acl` requests signed with AWS Signature v4 by hand.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Url};
use s3::bucket_ops::CannedBucketAcl;
use s3::command::Command;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::request::tokio_backend::ReqwestRequest;
use s3::request::Request;
use s3::{Bucket, BucketConfiguration, Region};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::core::error::{Result, StorageError};
use crate::modules::storage::acl::AclPolicy;
use crate::modules::storage::backend::{
    BucketConnector, ConnectionConfig, ListPage, ObjectBucket, ObjectMeta,
};
use crate::modules::storage::location::Location;

type HmacSha256 = Hmac<Sha256>;

/// Connects to an S3-compatible endpoint with path-style addressing
#[derive(Debug, Clone)]
pub struct S3Connector {
    http_client: Client,
}

impl S3Connector {
    pub fn new() -> Result<Self> {
        // HTTP client for object ACL requests
        let http_client = Client::builder()
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    /// Region and credentials for the configured endpoint
    fn connect(&self, config: &ConnectionConfig) -> Result<(Region, Credentials)> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Config(format!("Failed to create S3 credentials: {}", e)))?;

        let region = Region::Custom {
            region: config.signing_region().to_string(),
            endpoint: config.endpoint(),
        };

        Ok((region, credentials))
    }

    fn wrap(&self, mut bucket: Box<Bucket>, config: &ConnectionConfig) -> S3Bucket {
        // Use path-style URLs (http://endpoint/bucket instead of http://bucket.endpoint)
        bucket.set_path_style();

        S3Bucket {
            bucket,
            name: config.bucket_name.clone(),
            endpoint: config.endpoint(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            region_name: config.signing_region().to_string(),
            http_client: self.http_client.clone(),
        }
    }
}

/// Create-bucket settings: the canned policy goes out as `x-amz-acl`, and the
/// body carries a `LocationConstraint` only for a non-default location
fn bucket_configuration(config: &ConnectionConfig) -> BucketConfiguration {
    let location_constraint = config
        .location
        .filter(|location| *location != Location::Default)
        .map(|location| Region::Custom {
            region: location.constraint().to_string(),
            endpoint: config.endpoint(),
        });

    BucketConfiguration::new(
        Some(CannedBucketAcl::Custom(config.policy.as_str().to_string())),
        false,
        None,
        None,
        None,
        None,
        None,
        location_constraint,
    )
}

#[async_trait]
impl BucketConnector for S3Connector {
    type Bucket = S3Bucket;

    async fn create_bucket(&self, config: &ConnectionConfig) -> Result<S3Bucket> {
        let (region, credentials) = self.connect(config)?;
        let create_failed = |e: S3Error| match e {
            S3Error::HttpFailWithBody(code, body) => {
                classify_create_failure(&config.bucket_name, code, &body)
            }
            other => StorageError::Provisioning(format!(
                "Failed to create bucket '{}': {}",
                config.bucket_name, other
            )),
        };

        // Bucket::create_with_path_style would replace the location constraint
        // with the signing region, so the request is issued directly
        let bucket = Bucket::new(&config.bucket_name, region, credentials)
            .map_err(create_failed)?
            .with_path_style();
        let command = Command::CreateBucket {
            config: bucket_configuration(config),
        };
        let response = ReqwestRequest::new(&bucket, "", command)
            .await
            .map_err(create_failed)?
            .response_data(false)
            .await
            .map_err(create_failed)?;

        let code = response.status_code();
        if !is_success(code) {
            let body = String::from_utf8_lossy(response.as_slice());
            return Err(classify_create_failure(&config.bucket_name, code, &body));
        }

        info!(
            "Bucket '{}' created at {} with policy {}",
            config.bucket_name,
            config.endpoint(),
            config.policy
        );
        Ok(self.wrap(bucket, config))
    }

    async fn get_bucket(&self, config: &ConnectionConfig) -> Result<S3Bucket> {
        let (region, credentials) = self.connect(config)?;

        let bucket = Bucket::new(&config.bucket_name, region, credentials).map_err(|e| {
            StorageError::Provisioning(format!(
                "Failed to open bucket '{}': {}",
                config.bucket_name, e
            ))
        })?;
        let bucket = self.wrap(bucket, config);

        // Touch the bucket so a missing one fails here rather than on first use
        let (_, code) = bucket
            .bucket
            .list_page(String::new(), None, None, None, Some(1))
            .await
            .map_err(|e| {
                StorageError::Provisioning(format!(
                    "Failed to fetch bucket '{}': {}",
                    config.bucket_name, e
                ))
            })?;
        if !is_success(code) {
            return Err(StorageError::Provisioning(format!(
                "Failed to fetch bucket '{}': status {}",
                config.bucket_name, code
            )));
        }

        debug!("Using existing bucket '{}'", config.bucket_name);
        Ok(bucket)
    }
}

fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

fn classify_create_failure(bucket: &str, code: u16, body: &str) -> StorageError {
    if code == 409
        || body.contains("BucketAlreadyOwnedByYou")
        || body.contains("BucketAlreadyExists")
    {
        StorageError::AlreadyExists(bucket.to_string())
    } else if code == 403 || body.contains("AccessDenied") {
        StorageError::AccessDenied(format!("create bucket '{}'", bucket))
    } else {
        StorageError::Provisioning(format!(
            "Failed to create bucket '{}': {} - {}",
            bucket, code, body
        ))
    }
}

/// Status code carried by a rust-s3 error, if any
fn error_status(e: &S3Error) -> Option<u16> {
    match e {
        S3Error::HttpFailWithBody(code, _) => Some(*code),
        _ => None,
    }
}

/// URI-encode a key, keeping the `/` separators
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Bucket handle over rust-s3
pub struct S3Bucket {
    bucket: Box<Bucket>,
    name: String,
    endpoint: String,
    /// Access key for AWS Signature v4 signing
    access_key: String,
    /// Secret key for AWS Signature v4 signing
    secret_key: String,
    /// Region name for AWS Signature v4 signing
    region_name: String,
    /// HTTP client for ACL requests
    http_client: Client,
}

impl std::fmt::Debug for S3Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Bucket")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("region_name", &self.region_name)
            .finish_non_exhaustive()
    }
}

impl S3Bucket {
    /// Put a canned ACL on the object at `canonical_uri` (`/{bucket}/{key}`)
    async fn put_acl(&self, canonical_uri: &str, policy: AclPolicy) -> Result<()> {
        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let endpoint_url = Url::parse(&self.endpoint)
            .map_err(|e| StorageError::Config(format!("Invalid endpoint URL: {}", e)))?;
        let host = endpoint_url
            .host_str()
            .ok_or_else(|| StorageError::Config("Endpoint URL has no host".to_string()))?;
        let host_header = match endpoint_url.port() {
            Some(p) => format!("{}:{}", host, p),
            None => host.to_string(),
        };

        let url = format!("{}{}?acl", self.endpoint, canonical_uri);

        // Empty body
        let payload_hash = hex::encode(Sha256::digest(b""));

        let canonical_querystring = "acl=";
        let canonical_headers = format!(
            "host:{}\nx-amz-acl:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            host_header, policy, payload_hash, amz_date
        );
        let signed_headers = "host;x-amz-acl;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "PUT\n{}\n{}\n{}\n{}\n{}",
            canonical_uri, canonical_querystring, canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region_name);
        let canonical_request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm, amz_date, credential_scope, canonical_request_hash
        );

        let signature = self.calculate_signature(&date_stamp, &string_to_sign)?;

        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.access_key, credential_scope, signed_headers, signature
        );

        let response = self
            .http_client
            .put(&url)
            .header("Host", &host_header)
            .header("x-amz-acl", policy.as_str())
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", &payload_hash)
            .header("Authorization", &authorization_header)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to send ACL request: {}", e)))?;

        if response.status().is_success() {
            debug!("Set ACL {} on {}", policy, canonical_uri);
            Ok(())
        } else {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(StorageError::Backend(format!(
                "Failed to set ACL on {}: {} - {}",
                canonical_uri, status, body
            )))
        }
    }

    /// Calculate AWS Signature v4 signature
    fn calculate_signature(&self, date_stamp: &str, string_to_sign: &str) -> Result<String> {
        let k_date = Self::hmac_sha256(
            format!("AWS4{}", self.secret_key).as_bytes(),
            date_stamp.as_bytes(),
        )?;
        let k_region = Self::hmac_sha256(&k_date, self.region_name.as_bytes())?;
        let k_service = Self::hmac_sha256(&k_region, b"s3")?;
        let k_signing = Self::hmac_sha256(&k_service, b"aws4_request")?;

        let signature = Self::hmac_sha256(&k_signing, string_to_sign.as_bytes())?;
        Ok(hex::encode(signature))
    }

    fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| StorageError::Config(format!("HMAC key error: {}", e)))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn object_uri(&self, key: &str) -> String {
        format!("/{}/{}", self.name, encode_key(key))
    }
}

#[async_trait]
impl ObjectBucket for S3Bucket {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let (head, code) = match self.bucket.head_object(key).await {
            Ok(result) => result,
            Err(e) if error_status(&e) == Some(404) => return Ok(None),
            Err(e) => {
                return Err(StorageError::Backend(format!(
                    "Failed to look up '{}': {}",
                    key, e
                )))
            }
        };

        match code {
            404 => Ok(None),
            c if is_success(c) => Ok(Some(ObjectMeta {
                size: head.content_length.unwrap_or(0).max(0) as u64,
                last_modified: head.last_modified,
            })),
            c => Err(StorageError::Backend(format!(
                "Failed to look up '{}': status {}",
                key, c
            ))),
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self.bucket.get_object(key).await.map_err(|e| {
            if error_status(&e) == Some(404) {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Backend(format!("Failed to download file '{}': {}", key, e))
            }
        })?;

        match response.status_code() {
            404 => Err(StorageError::NotFound(key.to_string())),
            c if is_success(c) => {
                debug!("Downloaded file '{}' from bucket '{}'", key, self.name);
                Ok(response.bytes().to_vec())
            }
            c => Err(StorageError::Backend(format!(
                "Failed to download file '{}': {} - {}",
                key,
                c,
                String::from_utf8_lossy(response.bytes())
            ))),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let response = self
            .bucket
            .put_object(key, data)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to upload file '{}': {}", key, e)))?;

        if !is_success(response.status_code()) {
            return Err(StorageError::Backend(format!(
                "Failed to upload file '{}': {} - {}",
                key,
                response.status_code(),
                String::from_utf8_lossy(response.bytes())
            )));
        }

        debug!("Uploaded file '{}' to bucket '{}'", key, self.name);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = match self.bucket.delete_object(key).await {
            Ok(response) => response,
            Err(e) if error_status(&e) == Some(404) => return Ok(()),
            Err(e) => {
                return Err(StorageError::Backend(format!(
                    "Failed to delete file '{}': {}",
                    key, e
                )))
            }
        };

        let code = response.status_code();
        if is_success(code) || code == 404 {
            debug!("Deleted file '{}' from bucket '{}'", key, self.name);
            Ok(())
        } else {
            Err(StorageError::Backend(format!(
                "Failed to delete file '{}': status {}",
                key, code
            )))
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        delimiter: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let (result, code) = self
            .bucket
            .list_page(
                prefix.to_string(),
                Some(delimiter.to_string()),
                continuation_token,
                None,
                None,
            )
            .await
            .map_err(|e| {
                StorageError::Backend(format!("Failed to list prefix '{}': {}", prefix, e))
            })?;

        if !is_success(code) {
            return Err(StorageError::Backend(format!(
                "Failed to list prefix '{}': status {}",
                prefix, code
            )));
        }

        let mut names: Vec<String> = result.contents.into_iter().map(|obj| obj.key).collect();
        names.extend(
            result
                .common_prefixes
                .into_iter()
                .flatten()
                .map(|common| common.prefix),
        );

        let next_token = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };

        Ok(ListPage { names, next_token })
    }

    async fn generate_url(&self, key: &str, expires: u32, query_auth: bool) -> Result<String> {
        if !query_auth {
            return Ok(format!("{}{}", self.endpoint, self.object_uri(key)));
        }

        self.bucket.presign_get(key, expires, None).await.map_err(|e| {
            StorageError::Backend(format!(
                "Failed to generate presigned URL for '{}': {}",
                key, e
            ))
        })
    }

    async fn set_acl(&self, key: &str, policy: AclPolicy) -> Result<()> {
        self.put_acl(&self.object_uri(key), policy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;
    use tokio_test::assert_ok;

    #[test]
    fn test_encode_key_keeps_separators() {
        assert_eq!(encode_key("media/a b/c+d.txt"), "media/a%20b/c%2Bd.txt");
        assert_eq!(encode_key("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_classify_create_failure() {
        assert!(matches!(
            classify_create_failure("b", 409, "<Code>BucketAlreadyOwnedByYou</Code>"),
            StorageError::AlreadyExists(_)
        ));
        assert!(matches!(
            classify_create_failure("b", 403, "<Code>AccessDenied</Code>"),
            StorageError::AccessDenied(_)
        ));
        assert!(matches!(
            classify_create_failure("b", 400, "<Code>InvalidBucketName</Code>"),
            StorageError::Provisioning(_)
        ));
    }

    fn connection_config(location: Option<Location>, policy: AclPolicy) -> ConnectionConfig {
        ConnectionConfig {
            bucket_name: "media".to_string(),
            access_key: "key".to_string(),
            secret_key: "secret".to_string(),
            host: "s3.amazonaws.com".to_string(),
            location,
            policy,
        }
    }

    #[test]
    fn test_create_payload_for_default_locations_is_empty() {
        for location in [None, Some(Location::Default)] {
            let payload = bucket_configuration(&connection_config(location, AclPolicy::PublicRead))
                .location_constraint_payload();

            assert_eq!(payload, None, "location {:?}", location);
        }
    }

    #[test]
    fn test_create_payload_carries_location_constraint() {
        let cases = [
            (Location::EU, "EU"),
            (Location::APSoutheast2, "ap-southeast-2"),
        ];

        for (location, constraint) in cases {
            let payload =
                bucket_configuration(&connection_config(Some(location), AclPolicy::PublicRead))
                    .location_constraint_payload();

            assert_eq!(
                payload,
                Some(format!(
                    "<CreateBucketConfiguration><LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
                    constraint
                ))
            );
        }
    }

    #[test]
    fn test_create_headers_carry_policy() {
        for policy in [AclPolicy::PublicRead, AclPolicy::BucketOwnerFullControl] {
            let mut headers = HeaderMap::new();
            bucket_configuration(&connection_config(None, policy))
                .add_headers(&mut headers)
                .unwrap();

            assert_eq!(headers.get("x-amz-acl").unwrap(), policy.as_str());
            assert_eq!(headers.len(), 1);
        }
    }

    #[test]
    fn test_connector_builds_http_client() {
        assert_ok!(S3Connector::new());
    }

    #[test]
    fn test_signature_is_deterministic_hex() {
        let connector = S3Connector::new().unwrap();
        let config = ConnectionConfig {
            bucket_name: "media".to_string(),
            access_key: "AKIDEXAMPLE".to_string(),
            secret_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            host: "http://localhost:9000".to_string(),
            location: None,
            policy: AclPolicy::PublicRead,
        };
        let (region, credentials) = connector.connect(&config).unwrap();
        let bucket = connector.wrap(
            Bucket::new("media", region, credentials).unwrap(),
            &config,
        );

        let first = bucket.calculate_signature("20240101", "string-to-sign").unwrap();
        let second = bucket.calculate_signature("20240101", "string-to-sign").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_plain_url_is_path_style() {
        let connector = S3Connector::new().unwrap();
        let config = ConnectionConfig {
            bucket_name: "media".to_string(),
            access_key: "key".to_string(),
            secret_key: "secret".to_string(),
            host: "s3.amazonaws.com".to_string(),
            location: None,
            policy: AclPolicy::PublicRead,
        };
        let (region, credentials) = connector.connect(&config).unwrap();
        let bucket = connector.wrap(
            Bucket::new("media", region, credentials).unwrap(),
            &config,
        );

        let url = bucket.generate_url("docs/a b.pdf", 30, false).await.unwrap();
        assert_eq!(url, "https://s3.amazonaws.com/media/docs/a%20b.pdf");
    }
}
