use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use spinepub::{
    ExtensionRegistry, FilesystemStorage, InMemoryLiveStore, Publisher, PublisherConfig,
};

use crate::error::{CliError, ExitStatus};
use crate::util::Verbosity;

const DEFAULT_DATA_FILE: &str = "live.json";

pub struct CliSession {
    pub config: PublisherConfig,
    pub data_path: PathBuf,
    pub store: Arc<InMemoryLiveStore>,
    pub publisher: Publisher,
    pub verbosity: Verbosity,
}

impl CliSession {
    /// Resolves configuration (file, then environment) and opens storage and live data.
    pub async fn bootstrap(
        config_path: Option<String>,
        data_path: Option<String>,
        verbosity: Verbosity,
    ) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => {
                let vars: BTreeMap<String, String> = std::env::vars().collect();
                PublisherConfig::from_file(path)?.with_overrides(&vars)?
            }
            None => PublisherConfig::from_env()?,
        };

        let data_path = PathBuf::from(data_path.unwrap_or_else(|| DEFAULT_DATA_FILE.to_string()));
        if !data_path.is_file() {
            return Err(CliError::new(
                format!("live data file {} does not exist", data_path.display()),
                ExitStatus::Usage,
            ));
        }
        let store = Arc::new(InMemoryLiveStore::load(&data_path)?);
        let storage = Arc::new(FilesystemStorage::open(&config.storage).await?);
        let publisher = Publisher::new(&config, storage, store.clone(), ExtensionRegistry::new());

        Ok(Self {
            config,
            data_path,
            store,
            publisher,
            verbosity,
        })
    }

    /// Writes the live data back so `publishedAt` changes persist between runs.
    pub fn persist(&self) -> Result<(), CliError> {
        self.store.save(&self.data_path)?;
        Ok(())
    }
}
