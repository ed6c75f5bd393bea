//! Read-only views over a committed [`ProfileAggregate`].

use latency_core::{Category, CategoryFilter, EndpointEntry, ProfileAggregate};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

/// `"{n}. {METHOD} {url}"` where `n` is the 1-based ordinal of `seq`.
pub fn display_key(seq: u64, entry: &EndpointEntry) -> String {
    format!("{}. {} {}", seq + 1, entry.method, entry.url())
}

/// Badge label: empty when there is nothing to show.
pub fn badge_text(count: usize) -> String {
    if count > 0 {
        count.to_string()
    } else {
        String::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub seq: u64,
    pub category: Category,
    pub entry: EndpointEntry,
}

impl SummaryRow {
    pub fn ordinal(&self) -> u64 {
        self.seq + 1
    }

    pub fn display_key(&self) -> String {
        display_key(self.seq, &self.entry)
    }
}

/// Flat `display key -> latency ms` map, serialized in sequence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportPayload {
    entries: Vec<(String, u64)>,
}

impl ExportPayload {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, latency)| *latency)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl Serialize for ExportPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, latency) in &self.entries {
            map.serialize_entry(key, latency)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub endpoints: usize,
    pub latency_p50: Duration,
    pub latency_p95: Duration,
    pub average_latency: Duration,
    pub min_latency: Duration,
    pub max_latency: Duration,
}

pub struct SummaryProjector;

impl SummaryProjector {
    pub fn count(aggregate: &ProfileAggregate, filter: &CategoryFilter) -> usize {
        if filter.is_all() {
            return aggregate.len();
        }
        aggregate
            .iter()
            .filter(|(_, entry)| filter.matches(entry.category()))
            .count()
    }

    /// Matching entries in ascending sequence order.
    pub fn list(aggregate: &ProfileAggregate, filter: &CategoryFilter) -> Vec<SummaryRow> {
        aggregate
            .iter()
            .filter_map(|(seq, entry)| {
                let category = entry.category();
                filter.matches(category).then(|| SummaryRow {
                    seq,
                    category,
                    entry: entry.clone(),
                })
            })
            .collect()
    }

    pub fn export_payload(aggregate: &ProfileAggregate, filter: &CategoryFilter) -> ExportPayload {
        ExportPayload {
            entries: Self::list(aggregate, filter)
                .iter()
                .map(|row| (row.display_key(), row.entry.latency_ms))
                .collect(),
        }
    }

    /// Distribution of the per-endpoint worst latencies.
    pub fn stats(rows: &[SummaryRow]) -> LatencyStats {
        let mut latencies: Vec<Duration> = rows
            .iter()
            .map(|row| Duration::from_millis(row.entry.latency_ms))
            .collect();
        latencies.sort();

        let (Some(&min), Some(&max)) = (latencies.first(), latencies.last()) else {
            return LatencyStats::default();
        };

        LatencyStats {
            endpoints: latencies.len(),
            latency_p50: Self::percentile(&latencies, 0.50),
            latency_p95: Self::percentile(&latencies, 0.95),
            average_latency: Self::average(&latencies),
            min_latency: min,
            max_latency: max,
        }
    }

    fn percentile(sorted: &[Duration], percentile: f64) -> Duration {
        if sorted.is_empty() {
            return Duration::ZERO;
        }

        let index = ((sorted.len() as f64) * percentile) as usize;
        let index = index.min(sorted.len() - 1);
        sorted[index]
    }

    fn average(durations: &[Duration]) -> Duration {
        if durations.is_empty() {
            return Duration::ZERO;
        }

        let sum: Duration = durations.iter().sum();
        sum / durations.len() as u32
    }
}
