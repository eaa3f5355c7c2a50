mod filesystem;
mod memory;

pub use filesystem::FilesystemStorage;
pub use memory::MemoryStorage;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PublishError;

/// Options for a single write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub content_type: Option<String>,
}

impl SaveOptions {
    /// Content type guessed from the key's extension.
    pub fn for_key(key: &str) -> Self {
        Self {
            content_type: Some(content_type_for(key).to_string()),
        }
    }
}

/// Options for building a servable URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UrlOptions {
    /// File name offered to the browser as an attachment.
    pub download: Option<String>,
}

/// Keyed blob storage with atomic per-key put/get/delete.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn get_file(&self, key: &str) -> Result<Option<Vec<u8>>, PublishError>;
    async fn save_file(
        &self,
        key: &str,
        data: Vec<u8>,
        options: SaveOptions,
    ) -> Result<(), PublishError>;
    /// Deleting a missing key succeeds.
    async fn delete_file(&self, key: &str) -> Result<(), PublishError>;
    async fn copy_file(&self, key: &str, new_key: &str) -> Result<(), PublishError>;
    async fn file_exists(&self, key: &str) -> Result<bool, PublishError>;
    async fn get_file_url(&self, key: &str, options: UrlOptions) -> Result<String, PublishError>;

    async fn move_file(&self, key: &str, new_key: &str) -> Result<(), PublishError> {
        self.copy_file(key, new_key).await?;
        self.delete_file(key).await
    }
}

#[async_trait]
impl<S> ObjectStorage for Arc<S>
where
    S: ObjectStorage + ?Sized,
{
    async fn get_file(&self, key: &str) -> Result<Option<Vec<u8>>, PublishError> {
        (**self).get_file(key).await
    }

    async fn save_file(
        &self,
        key: &str,
        data: Vec<u8>,
        options: SaveOptions,
    ) -> Result<(), PublishError> {
        (**self).save_file(key, data, options).await
    }

    async fn delete_file(&self, key: &str) -> Result<(), PublishError> {
        (**self).delete_file(key).await
    }

    async fn copy_file(&self, key: &str, new_key: &str) -> Result<(), PublishError> {
        (**self).copy_file(key, new_key).await
    }

    async fn file_exists(&self, key: &str) -> Result<bool, PublishError> {
        (**self).file_exists(key).await
    }

    async fn get_file_url(&self, key: &str, options: UrlOptions) -> Result<String, PublishError> {
        (**self).get_file_url(key, options).await
    }

    async fn move_file(&self, key: &str, new_key: &str) -> Result<(), PublishError> {
        (**self).move_file(key, new_key).await
    }
}

/// Rejects keys that could escape the storage root.
pub fn ensure_safe_key(key: &str) -> Result<(), PublishError> {
    if key.trim().is_empty() {
        return Err(PublishError::Storage("storage key must not be empty".into()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(PublishError::Storage(format!(
            "storage key '{key}' must be a relative, forward-slash path"
        )));
    }
    if key.split('/').any(|segment| segment == ".." || segment.is_empty()) {
        return Err(PublishError::Storage(format!(
            "storage key '{key}' must not contain empty or parent (..) segments"
        )));
    }
    Ok(())
}

pub fn content_type_for(key: &str) -> &'static str {
    let extension = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "js" => "application/javascript",
        "css" => "text/css",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}
