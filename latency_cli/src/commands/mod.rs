pub mod badge;
pub mod categories;
pub mod clear;
pub mod export;
pub mod filter;
pub mod profiles;
pub mod replay;
pub mod show;
pub mod validate;

use anyhow::Result;
use latency_core::{JsonFileStore, Profile};
use latency_session::{parse_config_from_file, EngineConfig, Recorder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Global options shared by every command.
pub struct Context {
    pub config: Option<PathBuf>,
    pub store: Option<PathBuf>,
}

impl Context {
    pub async fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => parse_config_from_file(path).await?,
            None => EngineConfig::default(),
        };
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
        Ok(config)
    }

    pub async fn recorder(&self) -> Result<Arc<Recorder<JsonFileStore>>> {
        let (_, recorder) = self.open().await?;
        Ok(recorder)
    }

    /// The effective config together with a recorder built from it.
    pub async fn open(&self) -> Result<(EngineConfig, Arc<Recorder<JsonFileStore>>)> {
        let config = self.engine_config().await?;
        debug!("Using store {}", config.store_path.display());
        let store = JsonFileStore::new(&config.store_path);
        let recorder = Arc::new(Recorder::new(store, &config));
        Ok((config, recorder))
    }
}

pub fn parse_profile(input: &str) -> Result<Profile> {
    Profile::parse(input).ok_or_else(|| anyhow::anyhow!("Invalid profile '{}'", input))
}
