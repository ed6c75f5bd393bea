use crate::error::{LatencyError, Result};
use crate::store::StoreError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded exponential backoff with ±30% jitter for store calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Capped at 2^20 times the base delay before jitter.
    const MAX_EXPONENT: u32 = 20;

    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(LatencyError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(LatencyError::InvalidConfig(format!(
                "retry.base_delay ({:?}) exceeds retry.max_delay ({:?})",
                self.base_delay, self.max_delay
            )));
        }
        Ok(())
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(Self::MAX_EXPONENT);
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let capped = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
        if capped == 0 {
            return Duration::ZERO;
        }

        let jitter = rand::thread_rng().gen_range(0.7..=1.3);
        Duration::from_millis((capped as f64 * jitter) as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(LatencyError::Store(e)),
                Err(e) if attempt >= max_attempts => {
                    return Err(LatencyError::StoreUnavailable {
                        attempts: attempt,
                        source: e,
                    })
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what, attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Serde adapter for `Duration` as humantime strings (`"50ms"`, `"5m"`).
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_growth_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(400));

        let first = policy.delay_for(1);
        assert!(first >= Duration::from_millis(70) && first <= Duration::from_millis(130));

        let late = policy.delay_for(9);
        assert!(late <= Duration::from_millis(520));
        assert!(late >= Duration::from_millis(280));
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::immediate(0).validate().is_err());
        assert!(RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(1))
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn test_run_recovers_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let value = RetryPolicy::immediate(5)
            .run("get", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::Unavailable("busy".into()))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = RetryPolicy::immediate(3)
            .run("set", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StoreError::Unavailable("down".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LatencyError::StoreUnavailable { attempts: 3, .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_does_not_retry_bad_data() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = RetryPolicy::immediate(3)
            .run("get", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let parsed: std::result::Result<u32, _> = serde_json::from_str("nope");
                parsed.map_err(StoreError::from)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LatencyError::Store(StoreError::Serialization(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
