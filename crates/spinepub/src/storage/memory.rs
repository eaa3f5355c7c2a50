use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::PublishError;

use super::{ObjectStorage, SaveOptions, UrlOptions, ensure_safe_key};

#[derive(Clone, Debug)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
}

/// Process-local storage used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .get(key)
            .and_then(|object| object.content_type.clone())
    }

    /// Parsed JSON document stored under `key`.
    pub fn json(&self, key: &str) -> Option<serde_json::Value> {
        let objects = self.objects.lock();
        let object = objects.get(key)?;
        serde_json::from_slice(&object.data).ok()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn get_file(&self, key: &str) -> Result<Option<Vec<u8>>, PublishError> {
        ensure_safe_key(key)?;
        Ok(self.objects.lock().get(key).map(|object| object.data.clone()))
    }

    async fn save_file(
        &self,
        key: &str,
        data: Vec<u8>,
        options: SaveOptions,
    ) -> Result<(), PublishError> {
        ensure_safe_key(key)?;
        self.objects.lock().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: options.content_type,
            },
        );
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> Result<(), PublishError> {
        ensure_safe_key(key)?;
        self.objects.lock().remove(key);
        Ok(())
    }

    async fn copy_file(&self, key: &str, new_key: &str) -> Result<(), PublishError> {
        ensure_safe_key(key)?;
        ensure_safe_key(new_key)?;
        let mut objects = self.objects.lock();
        let object = objects
            .get(key)
            .cloned()
            .ok_or_else(|| PublishError::Storage(format!("cannot copy missing key {key}")))?;
        objects.insert(new_key.to_string(), object);
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> Result<bool, PublishError> {
        ensure_safe_key(key)?;
        Ok(self.contains(key))
    }

    async fn get_file_url(&self, key: &str, _options: UrlOptions) -> Result<String, PublishError> {
        ensure_safe_key(key)?;
        Ok(format!("memory:///{key}"))
    }
}
