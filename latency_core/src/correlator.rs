use crate::error::{LatencyError, Result};
use crate::observation::Observation;
use crate::profile::{Profile, RequestId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_SCHEMES: [&str; 2] = ["http", "https"];

/// A request that has started but not yet completed or failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightRequest {
    pub profile: Profile,
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub query: String,
    pub start_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Registered,
    /// A stale entry under the same id was overwritten.
    Replaced,
    /// Scheme is not one we track.
    Filtered,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatorStats {
    pub started: u64,
    pub replaced: u64,
    pub filtered: u64,
    pub malformed: u64,
    pub completed: u64,
    pub untracked: u64,
    pub failed: u64,
    pub evicted: u64,
}

/// Pairs start and end events by request id. Owned by one interception
/// session; holds no persistent state.
#[derive(Debug)]
pub struct RequestCorrelator {
    schemes: Vec<String>,
    in_flight: HashMap<RequestId, InFlightRequest>,
    stats: CorrelatorStats,
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::with_schemes(DEFAULT_SCHEMES)
    }

    pub fn with_schemes<I, S>(schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            schemes: schemes
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
            in_flight: HashMap::new(),
            stats: CorrelatorStats::default(),
        }
    }

    /// Register a started request. `profile` falls back to the URL origin.
    pub fn on_start(
        &mut self,
        id: RequestId,
        profile: Option<Profile>,
        method: &str,
        url: &str,
        start_time_ms: u64,
    ) -> Result<StartOutcome> {
        // A reused id always invalidates the previous start, even when the
        // new one is filtered or rejected.
        let stale = self.in_flight.remove(&id);
        if let Some(stale) = &stale {
            self.stats.replaced += 1;
            debug!(
                "Request id {} reused; dropping entry started at {}",
                id, stale.start_time_ms
            );
        }

        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => return Err(self.malformed(url, e.to_string())),
        };

        if !self.schemes.iter().any(|s| s == parsed.scheme()) {
            self.stats.filtered += 1;
            metrics::counter!("latency_requests_filtered_total").increment(1);
            return Ok(StartOutcome::Filtered);
        }

        let Some(host) = parsed.host_str() else {
            return Err(self.malformed(url, "missing host".to_string()));
        };
        let host = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let profile = match profile.or_else(|| Profile::from_url(&parsed)) {
            Some(profile) => profile,
            None => return Err(self.malformed(url, "no origin".to_string())),
        };

        let query = match parsed.query() {
            Some(q) if !q.is_empty() => format!("?{}", q),
            _ => String::new(),
        };

        let request = InFlightRequest {
            profile,
            method: method.trim().to_ascii_uppercase(),
            scheme: parsed.scheme().to_string(),
            host,
            path: parsed.path().to_string(),
            query,
            start_time_ms,
        };

        self.stats.started += 1;
        metrics::counter!("latency_requests_started_total").increment(1);

        self.in_flight.insert(id, request);
        if stale.is_some() {
            Ok(StartOutcome::Replaced)
        } else {
            Ok(StartOutcome::Registered)
        }
    }

    /// Consume the in-flight entry for `id`. `None` is the normal outcome for
    /// requests that were never tracked or were already consumed.
    pub fn on_complete(&mut self, id: &RequestId, end_time_ms: u64) -> Option<Observation> {
        let Some(request) = self.in_flight.remove(id) else {
            self.stats.untracked += 1;
            metrics::counter!("latency_untracked_completions_total").increment(1);
            debug!("Completion for untracked request {}", id);
            return None;
        };

        self.stats.completed += 1;
        let latency_ms = end_time_ms.saturating_sub(request.start_time_ms);

        Some(Observation {
            profile: request.profile,
            method: request.method,
            scheme: request.scheme,
            host: request.host,
            path: request.path,
            query: request.query,
            latency_ms,
        })
    }

    /// Drop the in-flight entry for a failed request. Safe on unknown ids.
    pub fn on_error(&mut self, id: &RequestId) -> bool {
        let removed = self.in_flight.remove(id).is_some();
        if removed {
            self.stats.failed += 1;
        }
        removed
    }

    /// Evict entries whose start is more than `max_age` before `now_ms`.
    pub fn evict_stale(&mut self, now_ms: u64, max_age: Duration) -> usize {
        let max_age_ms = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
        let before = self.in_flight.len();
        self.in_flight
            .retain(|_, request| now_ms.saturating_sub(request.start_time_ms) <= max_age_ms);
        let evicted = before - self.in_flight.len();

        if evicted > 0 {
            self.stats.evicted += evicted as u64;
            metrics::counter!("latency_inflight_evicted_total").increment(evicted as u64);
            warn!("Evicted {} stale in-flight requests", evicted);
        }
        evicted
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> &CorrelatorStats {
        &self.stats
    }

    fn malformed(&mut self, url: &str, reason: String) -> LatencyError {
        self.stats.malformed += 1;
        metrics::counter!("latency_malformed_urls_total").increment(1);
        LatencyError::MalformedUrl {
            url: url.to_string(),
            reason,
        }
    }
}
