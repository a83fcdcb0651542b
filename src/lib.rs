//! File storage on S3-compatible object stores
//!
//! ```no_run
//! use bucket_storage::{S3Storage, Storage, StorageOptions, UrlOptions};
//!
//! # async fn run() -> bucket_storage::Result<()> {
//! let storage = S3Storage::from_env(StorageOptions::with_bucket("uploads"))?;
//!
//! let mut content = std::io::Cursor::new(b"hello".to_vec());
//! let name = storage.save("greetings/hello.txt", &mut content).await?;
//! let url = storage.url(&name, UrlOptions::signed(300)).await?;
//! # let _ = url;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod modules;
pub mod shared;

pub use crate::core::config::StorageSettings;
pub use crate::core::error::{Result, StorageError};
pub use crate::modules::storage::{
    AclPolicy, Location, S3Storage, Storage, StorageOptions, UrlOptions,
};
