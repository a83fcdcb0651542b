//! Canned access-control policies

use std::fmt;
use std::str::FromStr;

use crate::core::error::StorageError;

/// Canned ACL applied to the bucket at creation and to every saved object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclPolicy {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
    LogDeliveryWrite,
}

impl AclPolicy {
    /// Value of the `x-amz-acl` header
    pub fn as_str(&self) -> &'static str {
        match self {
            AclPolicy::Private => "private",
            AclPolicy::PublicRead => "public-read",
            AclPolicy::PublicReadWrite => "public-read-write",
            AclPolicy::AuthenticatedRead => "authenticated-read",
            AclPolicy::BucketOwnerRead => "bucket-owner-read",
            AclPolicy::BucketOwnerFullControl => "bucket-owner-full-control",
            AclPolicy::LogDeliveryWrite => "log-delivery-write",
        }
    }
}

impl FromStr for AclPolicy {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(AclPolicy::Private),
            "public-read" => Ok(AclPolicy::PublicRead),
            "public-read-write" => Ok(AclPolicy::PublicReadWrite),
            "authenticated-read" => Ok(AclPolicy::AuthenticatedRead),
            "bucket-owner-read" => Ok(AclPolicy::BucketOwnerRead),
            "bucket-owner-full-control" => Ok(AclPolicy::BucketOwnerFullControl),
            "log-delivery-write" => Ok(AclPolicy::LogDeliveryWrite),
            other => Err(StorageError::Config(format!(
                "Unknown access-control policy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AclPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canned_policies() {
        assert_eq!("public-read".parse::<AclPolicy>().unwrap(), AclPolicy::PublicRead);
        assert_eq!("private".parse::<AclPolicy>().unwrap(), AclPolicy::Private);
        assert_eq!(
            "bucket-owner-full-control".parse::<AclPolicy>().unwrap().as_str(),
            "bucket-owner-full-control"
        );
    }

    #[test]
    fn test_unknown_policy() {
        assert!(matches!(
            "world-writable".parse::<AclPolicy>(),
            Err(StorageError::Config(_))
        ));
    }
}
