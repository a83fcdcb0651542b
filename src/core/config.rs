use std::env;

/// Process-wide storage settings
///
/// These are the fallbacks for every field an `S3Storage` is not given
/// explicitly. Load once at startup and share.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// Bucket name (`BOTO_S3_BUCKET`)
    pub bucket_name: Option<String>,
    /// Access key id (`AWS_ACCESS_KEY_ID`)
    pub access_key: Option<String>,
    /// Secret access key (`AWS_SECRET_ACCESS_KEY`)
    pub secret_key: Option<String>,
    /// Endpoint host (`BOTO_S3_HOST`)
    pub host: String,
    /// Canned ACL applied to buckets and saved objects (`AWS_ACL_POLICY`)
    pub acl_policy: String,
    /// Hand out plain-http URLs by default (`AWS_S3_FORCE_HTTP_URL`)
    pub force_http_url: bool,
    /// Bucket location name, e.g. `APSoutheast2` (`BOTO_BUCKET_LOCATION`)
    pub bucket_location: Option<String>,
    /// Base URL used for the admin asset shortcut (`S3_URL`)
    pub s3_url: String,
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("bucket_name", &self.bucket_name)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("host", &self.host)
            .field("acl_policy", &self.acl_policy)
            .field("force_http_url", &self.force_http_url)
            .field("bucket_location", &self.bucket_location)
            .field("s3_url", &self.s3_url)
            .finish()
    }
}

impl StorageSettings {
    pub const DEFAULT_HOST: &'static str = "s3.amazonaws.com";
    pub const DEFAULT_ACL_POLICY: &'static str = "public-read";

    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    ///
    /// Empty values are treated the same as missing ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let force_http_url = match get("AWS_S3_FORCE_HTTP_URL") {
            Some(raw) => parse_flag(&raw)
                .ok_or_else(|| format!("AWS_S3_FORCE_HTTP_URL must be a boolean, got '{}'", raw))?,
            None => false,
        };

        Ok(Self {
            bucket_name: get("BOTO_S3_BUCKET"),
            access_key: get("AWS_ACCESS_KEY_ID"),
            secret_key: get("AWS_SECRET_ACCESS_KEY"),
            host: get("BOTO_S3_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string()),
            acl_policy: get("AWS_ACL_POLICY")
                .unwrap_or_else(|| Self::DEFAULT_ACL_POLICY.to_string()),
            force_http_url,
            bucket_location: get("BOTO_BUCKET_LOCATION"),
            s3_url: get("S3_URL").unwrap_or_default(),
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let settings = StorageSettings::from_lookup(|_| None).unwrap();

        assert_eq!(settings.bucket_name, None);
        assert_eq!(settings.host, "s3.amazonaws.com");
        assert_eq!(settings.acl_policy, "public-read");
        assert!(!settings.force_http_url);
        assert_eq!(settings.s3_url, "");
    }

    #[test]
    fn test_reads_every_key() {
        let settings = StorageSettings::from_lookup(lookup_from(&[
            ("BOTO_S3_BUCKET", "test_name"),
            ("AWS_ACCESS_KEY_ID", "test_key"),
            ("AWS_SECRET_ACCESS_KEY", "test_secret"),
            ("BOTO_S3_HOST", "minio.local:9000"),
            ("AWS_ACL_POLICY", "private"),
            ("AWS_S3_FORCE_HTTP_URL", "True"),
            ("BOTO_BUCKET_LOCATION", "APSoutheast2"),
            ("S3_URL", "https://cdn.example.com/"),
        ]))
        .unwrap();

        assert_eq!(settings.bucket_name.as_deref(), Some("test_name"));
        assert_eq!(settings.access_key.as_deref(), Some("test_key"));
        assert_eq!(settings.secret_key.as_deref(), Some("test_secret"));
        assert_eq!(settings.host, "minio.local:9000");
        assert_eq!(settings.acl_policy, "private");
        assert!(settings.force_http_url);
        assert_eq!(settings.bucket_location.as_deref(), Some("APSoutheast2"));
        assert_eq!(settings.s3_url, "https://cdn.example.com/");
    }

    #[test]
    fn test_empty_values_fall_back() {
        let settings =
            StorageSettings::from_lookup(lookup_from(&[("BOTO_S3_HOST", ""), ("BOTO_S3_BUCKET", "")]))
                .unwrap();

        assert_eq!(settings.host, "s3.amazonaws.com");
        assert_eq!(settings.bucket_name, None);
    }

    #[test]
    fn test_invalid_force_http_flag() {
        let result = StorageSettings::from_lookup(lookup_from(&[("AWS_S3_FORCE_HTTP_URL", "maybe")]));

        assert!(result.unwrap_err().contains("AWS_S3_FORCE_HTTP_URL"));
    }

    #[test]
    fn test_debug_hides_secret() {
        let settings =
            StorageSettings::from_lookup(lookup_from(&[("AWS_SECRET_ACCESS_KEY", "hunter2")]))
                .unwrap();

        assert!(!format!("{:?}", settings).contains("hunter2"));
    }
}
