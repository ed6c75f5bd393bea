use latency_core::correlator::DEFAULT_SCHEMES;
use latency_core::retry::humantime_serde;
use latency_core::{LatencyError, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// URL schemes the correlator tracks.
    #[serde(default = "default_schemes")]
    pub schemes: Vec<String>,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// In-flight requests older than this are evicted.
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
    /// How often the reaper runs. Zero disables it.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(300),
            interval: Duration::from_secs(30),
        }
    }
}

impl ReaperConfig {
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigFile {
    pub engine: EngineConfig,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("latency-store.json")
}

fn default_schemes() -> Vec<String> {
    DEFAULT_SCHEMES.iter().map(|s| s.to_string()).collect()
}

fn default_notification_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            schemes: default_schemes(),
            reaper: ReaperConfig::default(),
            retry: RetryPolicy::default(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn validate(&self) -> latency_core::Result<()> {
        if self.schemes.is_empty() {
            return Err(invalid("At least one URL scheme must be tracked".to_string()));
        }

        for (i, scheme) in self.schemes.iter().enumerate() {
            if scheme.trim().is_empty() {
                return Err(invalid(format!("Scheme {} cannot be empty", i)));
            }
            if scheme.contains("://") {
                return Err(invalid(format!("Scheme '{}' must not include '://'", scheme)));
            }
        }

        if self.store_path.as_os_str().is_empty() {
            return Err(invalid("store_path cannot be empty".to_string()));
        }

        if self.notification_capacity == 0 {
            return Err(invalid("notification_capacity must be > 0".to_string()));
        }

        if self.reaper.is_enabled() && self.reaper.max_age.is_zero() {
            return Err(invalid(
                "reaper.max_age must be > 0 when the reaper is enabled".to_string(),
            ));
        }

        self.retry.validate()
    }
}

fn invalid(reason: String) -> LatencyError {
    LatencyError::InvalidConfig(reason)
}

#[derive(Default)]
pub struct EngineConfigBuilder {
    store_path: Option<PathBuf>,
    schemes: Option<Vec<String>>,
    reaper: Option<ReaperConfig>,
    retry: Option<RetryPolicy>,
    notification_capacity: Option<usize>,
}

impl EngineConfigBuilder {
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.schemes.get_or_insert_with(Vec::new).push(scheme.into());
        self
    }

    pub fn reaper(mut self, max_age: Duration, interval: Duration) -> Self {
        self.reaper = Some(ReaperConfig { max_age, interval });
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> EngineConfig {
        EngineConfig {
            store_path: self.store_path.unwrap_or_else(default_store_path),
            schemes: self.schemes.unwrap_or_else(default_schemes),
            reaper: self.reaper.unwrap_or_default(),
            retry: self.retry.unwrap_or_default(),
            notification_capacity: self
                .notification_capacity
                .unwrap_or_else(default_notification_capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::builder()
            .store_path("/tmp/logs.json")
            .scheme("https")
            .scheme("wss")
            .reaper(Duration::from_secs(60), Duration::from_secs(5))
            .build();

        assert_eq!(config.schemes, vec!["https".to_string(), "wss".to_string()]);
        assert_eq!(config.reaper.max_age, Duration::from_secs(60));
        assert_eq!(config.notification_capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(EngineConfig::default().validate().is_ok());

        let mut config = EngineConfig::default();
        config.schemes.clear();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.schemes = vec!["https://".to_string()];
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(LatencyError::InvalidConfig(_))));

        let disabled = EngineConfig::builder()
            .reaper(Duration::ZERO, Duration::ZERO)
            .build();
        assert!(disabled.validate().is_ok());
        assert!(!disabled.reaper.is_enabled());
    }
}
