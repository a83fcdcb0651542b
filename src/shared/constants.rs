/// Admin asset directory served from the static base URL instead of the bucket
pub const ADMIN_ASSET_PATH: &str = "admin/";

/// Separator used when listing keys under a prefix
pub const LIST_DELIMITER: &str = "/";

/// Label prefixed to the bucket name when a storage is displayed
pub const STORAGE_LABEL: &str = "S3 Bucket Storage";
