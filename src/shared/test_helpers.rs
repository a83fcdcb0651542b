#![cfg(test)]
//! In-memory bucket used by the storage tests

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core::config::StorageSettings;
use crate::core::error::{Result, StorageError};
use crate::modules::storage::acl::AclPolicy;
use crate::modules::storage::backend::{
    BucketConnector, ConnectionConfig, ListPage, ObjectBucket, ObjectMeta,
};

pub const TEST_LAST_MODIFIED: &str = "Mon, 12 Oct 2009 17:50:00 GMT";

/// How `create_bucket` should fail, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFailure {
    Denied,
    Broken,
}

#[derive(Debug)]
pub struct MemoryState {
    pub bucket_exists: bool,
    pub objects: BTreeMap<String, Vec<u8>>,
    pub acls: HashMap<String, AclPolicy>,
    pub create_failure: Option<CreateFailure>,
    /// Store only this many bytes of every upload
    pub truncate_uploads_to: Option<usize>,
    pub fail_uploads: bool,
    pub page_size: usize,
    pub create_calls: usize,
    pub get_calls: usize,
    pub list_calls: usize,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            bucket_exists: false,
            objects: BTreeMap::new(),
            acls: HashMap::new(),
            create_failure: None,
            truncate_uploads_to: None,
            fail_uploads: false,
            page_size: 1000,
            create_calls: 0,
            get_calls: 0,
            list_calls: 0,
        }
    }
}

/// Connector whose buckets all share one in-memory state
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    /// Seed an object directly, bypassing the adapter
    pub fn insert(&self, key: &str, data: &[u8]) {
        let mut state = self.state();
        state.bucket_exists = true;
        state.objects.insert(key.to_string(), data.to_vec());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state().objects.get(key).cloned()
    }
}

#[async_trait]
impl BucketConnector for MemoryConnector {
    type Bucket = MemoryBucket;

    async fn create_bucket(&self, config: &ConnectionConfig) -> Result<MemoryBucket> {
        let mut state = self.state();
        state.create_calls += 1;

        match state.create_failure {
            Some(CreateFailure::Denied) => {
                return Err(StorageError::AccessDenied(config.bucket_name.clone()))
            }
            Some(CreateFailure::Broken) => {
                return Err(StorageError::Provisioning(format!(
                    "Failed to create bucket '{}': 400 - InvalidBucketName",
                    config.bucket_name
                )))
            }
            None => {}
        }

        if state.bucket_exists {
            return Err(StorageError::AlreadyExists(config.bucket_name.clone()));
        }
        state.bucket_exists = true;

        Ok(MemoryBucket {
            name: config.bucket_name.clone(),
            state: Arc::clone(&self.state),
        })
    }

    async fn get_bucket(&self, config: &ConnectionConfig) -> Result<MemoryBucket> {
        let mut state = self.state();
        state.get_calls += 1;

        if !state.bucket_exists {
            return Err(StorageError::Provisioning(format!(
                "Failed to fetch bucket '{}': status 404",
                config.bucket_name
            )));
        }

        Ok(MemoryBucket {
            name: config.bucket_name.clone(),
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct MemoryBucket {
    name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBucket {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ObjectBucket for MemoryBucket {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(self.state().objects.get(key).map(|data| ObjectMeta {
            size: data.len() as u64,
            last_modified: Some(TEST_LAST_MODIFIED.to_string()),
        }))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.state()
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.fail_uploads {
            return Err(StorageError::Backend("connection reset by peer".to_string()));
        }

        let stored = match state.truncate_uploads_to {
            Some(limit) => data[..limit.min(data.len())].to_vec(),
            None => data.to_vec(),
        };
        state.objects.insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state();
        state.objects.remove(key);
        state.acls.remove(key);
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        delimiter: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let mut state = self.state();
        state.list_calls += 1;

        let entries: BTreeSet<String> = state
            .objects
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(prefix)?;
                Some(match rest.find(delimiter) {
                    Some(idx) => format!("{}{}", prefix, &rest[..idx + delimiter.len()]),
                    None => key.clone(),
                })
            })
            .collect();

        let start = continuation_token
            .map(|token| token.parse::<usize>().unwrap())
            .unwrap_or(0);
        let names: Vec<String> = entries
            .iter()
            .skip(start)
            .take(state.page_size)
            .cloned()
            .collect();
        let end = start + names.len();
        let next_token = (end < entries.len()).then(|| end.to_string());

        Ok(ListPage { names, next_token })
    }

    async fn generate_url(&self, key: &str, expires: u32, query_auth: bool) -> Result<String> {
        let base = format!("https://memory.test/{}/{}", self.name, key);
        if query_auth {
            Ok(format!("{}?X-Amz-Expires={}&X-Amz-Signature=test", base, expires))
        } else {
            Ok(base)
        }
    }

    async fn set_acl(&self, key: &str, policy: AclPolicy) -> Result<()> {
        self.state().acls.insert(key.to_string(), policy);
        Ok(())
    }
}

/// Settings as an application would configure them
pub fn test_settings() -> StorageSettings {
    StorageSettings::from_lookup(|key| {
        let value = match key {
            "BOTO_S3_BUCKET" => "test_name",
            "AWS_ACCESS_KEY_ID" => "test_key",
            "AWS_SECRET_ACCESS_KEY" => "test_secret",
            "BOTO_BUCKET_LOCATION" => "APSoutheast2",
            "S3_URL" => "https://static.example.com/",
            _ => return None,
        };
        Some(value.to_string())
    })
    .unwrap()
}
