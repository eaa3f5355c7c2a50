use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PublishError;

pub const ENV_FLAT_REPO_STRUCTURE: &str = "FLAT_REPO_STRUCTURE";
pub const ENV_STORAGE_PATH: &str = "STORAGE_PATH";
pub const ENV_STORAGE_PUBLIC_PATH: &str = "STORAGE_PUBLIC_PATH";
pub const ENV_STORAGE_ASSETS_PATH: &str = "STORAGE_ASSETS_PATH";

const DEFAULT_ASSETS_PATH: &str = "repository/assets";
const DEFAULT_STORAGE_ROOT: &str = "data";
const DEFAULT_PUBLIC_PATH: &str = "/storage";

/// How per-activity snapshot files are laid out under a repository.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryLayout {
    /// `repository/<repoId>/<activityId>/...`
    #[default]
    Nested,
    /// `repository/<repoId>/...`, with activity-prefixed assessment files.
    Flat,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct StorageConfig {
    pub root: PathBuf,
    pub public_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            public_path: DEFAULT_PUBLIC_PATH.to_string(),
        }
    }
}

/// Settings resolved once at startup and threaded through the publisher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PublisherConfig {
    pub layout: RepositoryLayout,
    /// Storage prefix for content-addressed uploads.
    pub assets_path: String,
    pub storage: StorageConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            layout: RepositoryLayout::default(),
            assets_path: DEFAULT_ASSETS_PATH.to_string(),
            storage: StorageConfig::default(),
        }
    }
}

impl PublisherConfig {
    /// Reads a YAML config file. Relative storage roots resolve against the file's folder.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PublishError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| {
            PublishError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let mut config: PublisherConfig = serde_yaml::from_str(&content)
            .map_err(|err| PublishError::Config(format!("invalid {}: {err}", path.display())))?;
        if config.storage.root.is_relative() {
            if let Some(dir) = path.parent() {
                config.storage.root = dir.join(&config.storage.root);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, PublishError> {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        Self::default().with_overrides(&vars)
    }

    /// Applies `FLAT_REPO_STRUCTURE` and `STORAGE_*` overrides from `vars`.
    pub fn with_overrides(mut self, vars: &BTreeMap<String, String>) -> Result<Self, PublishError> {
        if let Some(flat) = vars.get(ENV_FLAT_REPO_STRUCTURE) {
            self.layout = if flat.trim().is_empty() {
                RepositoryLayout::Nested
            } else {
                RepositoryLayout::Flat
            };
        }
        if let Some(root) = vars.get(ENV_STORAGE_PATH) {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(public_path) = vars.get(ENV_STORAGE_PUBLIC_PATH) {
            self.storage.public_path = public_path.clone();
        }
        if let Some(assets_path) = vars.get(ENV_STORAGE_ASSETS_PATH) {
            self.assets_path = assets_path.clone();
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), PublishError> {
        let assets = self.assets_path.trim_matches('/');
        if assets.is_empty() {
            return Err(PublishError::Config("assets_path must not be empty".into()));
        }
        if assets.split('/').any(|segment| segment == "..") {
            return Err(PublishError::Config(
                "assets_path must not traverse parent directories (..)".into(),
            ));
        }
        if self.storage.public_path.trim().is_empty() {
            return Err(PublishError::Config("storage.public_path must not be empty".into()));
        }
        Ok(())
    }
}
