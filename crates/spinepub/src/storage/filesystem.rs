use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::PublishError;

use super::{ObjectStorage, SaveOptions, UrlOptions, ensure_safe_key};

const RESPONSE_CONTENT_DISPOSITION: &str = "response-content-disposition";

/// Storage rooted in a local directory. Keys are relative paths below the root.
#[derive(Debug)]
pub struct FilesystemStorage {
    root: PathBuf,
    public_path: String,
    tmp_counter: AtomicU64,
}

impl FilesystemStorage {
    pub fn new(root: impl Into<PathBuf>, public_path: impl Into<String>) -> Self {
        let public_path = public_path.into();
        let public_path = format!("/{}", public_path.trim_matches('/'));
        Self {
            root: root.into(),
            public_path,
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub async fn open(config: &StorageConfig) -> Result<Self, PublishError> {
        fs::create_dir_all(&config.root).await.map_err(|err| {
            PublishError::Storage(format!(
                "failed to prepare storage root {}: {err}",
                config.root.display()
            ))
        })?;
        info!(path = %config.root.display(), "opened filesystem storage");
        Ok(Self::new(config.root.clone(), config.public_path.clone()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf, PublishError> {
        ensure_safe_key(key)?;
        Ok(self.root.join(key))
    }

    async fn prepare_parent(path: &Path) -> Result<(), PublishError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(|err| {
                PublishError::Storage(format!(
                    "failed to prepare directory {}: {err}",
                    dir.display()
                ))
            })?;
        }
        Ok(())
    }

    fn tmp_path(&self, path: &Path) -> PathBuf {
        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.{seq}.tmp", std::process::id()));
        path.with_file_name(name)
    }
}

#[async_trait]
impl ObjectStorage for FilesystemStorage {
    async fn get_file(&self, key: &str) -> Result<Option<Vec<u8>>, PublishError> {
        let path = self.path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PublishError::Storage(format!("failed to read {key}: {err}"))),
        }
    }

    async fn save_file(
        &self,
        key: &str,
        data: Vec<u8>,
        _options: SaveOptions,
    ) -> Result<(), PublishError> {
        let path = self.path(key)?;
        Self::prepare_parent(&path).await?;

        let tmp_path = self.tmp_path(&path);
        if let Err(err) = fs::write(&tmp_path, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(PublishError::Storage(format!(
                "failed to write temporary file {}: {err}",
                tmp_path.display()
            )));
        }
        if let Err(err) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(PublishError::Storage(format!("failed to publish {key}: {err}")));
        }
        debug!(key, bytes = data.len(), "saved file");
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> Result<(), PublishError> {
        let path = self.path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PublishError::Storage(format!("failed to delete {key}: {err}"))),
        }
    }

    async fn copy_file(&self, key: &str, new_key: &str) -> Result<(), PublishError> {
        let src = self.path(key)?;
        let dest = self.path(new_key)?;
        Self::prepare_parent(&dest).await?;
        fs::copy(&src, &dest).await.map_err(|err| {
            PublishError::Storage(format!("failed to copy {key} to {new_key}: {err}"))
        })?;
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> Result<bool, PublishError> {
        let path = self.path(key)?;
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(PublishError::Storage(format!("failed to stat {key}: {err}"))),
        }
    }

    async fn get_file_url(&self, key: &str, options: UrlOptions) -> Result<String, PublishError> {
        ensure_safe_key(key)?;
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("key", key);
        if let Some(name) = options.download {
            query.append_pair(RESPONSE_CONTENT_DISPOSITION, &content_disposition(&name));
        }
        Ok(format!("{}?{}", self.public_path, query.finish()))
    }
}

/// `attachment` disposition for `name`. Non-ASCII names get an RFC 5987
/// `filename*` parameter next to a `?`-substituted ASCII fallback.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .filter(|c| *c != '"')
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect();
    if name.is_ascii() {
        return format!("attachment; filename=\"{fallback}\"");
    }
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(name)
    )
}
