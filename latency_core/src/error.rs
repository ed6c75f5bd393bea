use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum LatencyError {
    #[error("Store unavailable after {attempts} attempts: {source}")]
    StoreUnavailable {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("Corrupt record '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Malformed URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl LatencyError {
    /// Whether this failure means the store could not be reached, as opposed
    /// to bad data or bad input.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LatencyError::StoreUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, LatencyError>;
