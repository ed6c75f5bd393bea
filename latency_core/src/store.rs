//! Key-value store seam.
//!
//! The store offers single `get`/`set` calls and nothing transactional
//! across them. Read-modify-write discipline lives in
//! [`crate::serializer::PersistenceSerializer`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the given keys. Absent keys are simply missing from the result.
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>, StoreError>;

    /// Write all entries, replacing existing values.
    async fn set(&self, entries: HashMap<String, Value>) -> Result<(), StoreError>;

    /// Every key currently stored.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>, StoreError> {
        (**self).get(keys).await
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<(), StoreError> {
        (**self).set(entries).await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).keys().await
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>, StoreError> {
        let values = self.values.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(key).map(|v| (key.clone(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<(), StoreError> {
        self.values.write().await.extend(entries);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.values.read().await.keys().cloned().collect())
    }
}

/// Store backed by a single JSON document on disk.
///
/// The document is loaded on first use and rewritten in full on every `set`
/// through a temp file and rename, so a crash never leaves a torn file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<Option<BTreeMap<String, Value>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Store file {} not found, starting empty", self.path.display());
                Ok(BTreeMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, document: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let json = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>, StoreError> {
        let mut guard = self.document.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let document = guard.get_or_insert_with(BTreeMap::new);
        Ok(keys
            .iter()
            .filter_map(|key| document.get(key).map(|v| (key.clone(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<(), StoreError> {
        let mut guard = self.document.lock().await;
        let mut document = match guard.take() {
            Some(document) => document,
            None => self.load().await?,
        };
        let previous = document.clone();
        document.extend(entries);

        match self.persist(&document).await {
            Ok(()) => {
                *guard = Some(document);
                Ok(())
            }
            Err(e) => {
                *guard = Some(previous);
                Err(e)
            }
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut guard = self.document.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(guard
            .as_ref()
            .map(|document| document.keys().cloned().collect())
            .unwrap_or_default())
    }
}
