//! Per-profile endpoint aggregation.
//!
//! Observations are folded into a [`ProfileAggregate`] under a running-maximum
//! policy: each logical endpoint keeps the worst latency seen so far, and keeps
//! the sequence number it was given the first time it was seen.

use crate::classifier::{classify, Category, EndpointDescriptor};
use crate::observation::Observation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logical endpoint identity: `METHOD:path?query`, query kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointKey(String);

impl EndpointKey {
    pub fn new(method: &str, path: &str, query: &str) -> Self {
        Self(format!("{}:{}{}", method, path, query))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display metadata of an endpoint, fixed at first sight, plus its max latency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub query: String,
    pub latency_ms: u64,
}

impl EndpointEntry {
    pub fn url(&self) -> String {
        format!("{}://{}{}{}", self.scheme, self.host, self.path, self.query)
    }

    pub fn category(&self) -> Category {
        classify(EndpointDescriptor::new(&self.scheme, &self.path))
    }

    pub fn endpoint_key(&self) -> EndpointKey {
        EndpointKey::new(&self.method, &self.path, &self.query)
    }
}

impl From<&Observation> for EndpointEntry {
    fn from(obs: &Observation) -> Self {
        Self {
            method: obs.method.clone(),
            scheme: obs.scheme.clone(),
            host: obs.host.clone(),
            path: obs.path.clone(),
            query: obs.query.clone(),
            latency_ms: obs.latency_ms,
        }
    }
}

/// The unit of persistence, one per profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAggregate {
    pub entries: BTreeMap<u64, EndpointEntry>,
    pub endpoint_index: BTreeMap<EndpointKey, u64>,
    pub next_seq: u64,
}

impl ProfileAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, seq: u64) -> Option<&EndpointEntry> {
        self.entries.get(&seq)
    }

    pub fn lookup(&self, key: &EndpointKey) -> Option<(u64, &EndpointEntry)> {
        let seq = *self.endpoint_index.get(key)?;
        self.entries.get(&seq).map(|entry| (seq, entry))
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &EndpointEntry)> {
        self.entries.iter().map(|(seq, entry)| (*seq, entry))
    }

    /// Checks that the index and the entries agree and that `next_seq` is
    /// above every assigned sequence number.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.endpoint_index.len() != self.entries.len() {
            return Err(format!(
                "index has {} keys but there are {} entries",
                self.endpoint_index.len(),
                self.entries.len()
            ));
        }
        for (key, seq) in &self.endpoint_index {
            let entry = self
                .entries
                .get(seq)
                .ok_or_else(|| format!("key '{}' points at missing entry {}", key, seq))?;
            if &entry.endpoint_key() != key {
                return Err(format!("entry {} does not match key '{}'", seq, key));
            }
        }
        if let Some((&max_seq, _)) = self.entries.iter().next_back() {
            if max_seq >= self.next_seq {
                return Err(format!(
                    "next_seq {} is not above assigned sequence {}",
                    self.next_seq, max_seq
                ));
            }
        }
        Ok(())
    }
}

/// What [`EndpointAggregator::apply_in_place`] did with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateChange {
    Inserted { seq: u64 },
    Raised { seq: u64, previous_ms: u64 },
    Unchanged { seq: u64 },
}

impl AggregateChange {
    pub fn seq(&self) -> u64 {
        match self {
            AggregateChange::Inserted { seq }
            | AggregateChange::Raised { seq, .. }
            | AggregateChange::Unchanged { seq } => *seq,
        }
    }

    pub fn is_modified(&self) -> bool {
        !matches!(self, AggregateChange::Unchanged { .. })
    }
}

pub struct EndpointAggregator;

impl EndpointAggregator {
    pub fn apply(mut aggregate: ProfileAggregate, obs: &Observation) -> ProfileAggregate {
        Self::apply_in_place(&mut aggregate, obs);
        aggregate
    }

    pub fn apply_in_place(aggregate: &mut ProfileAggregate, obs: &Observation) -> AggregateChange {
        let key = obs.endpoint_key();

        if let Some(&seq) = aggregate.endpoint_index.get(&key) {
            if let Some(entry) = aggregate.entries.get_mut(&seq) {
                if obs.latency_ms > entry.latency_ms {
                    let previous_ms = entry.latency_ms;
                    entry.latency_ms = obs.latency_ms;
                    return AggregateChange::Raised { seq, previous_ms };
                }
                return AggregateChange::Unchanged { seq };
            }
            // Dangling index entry: drop it and treat the key as new.
            aggregate.endpoint_index.remove(&key);
        }

        let seq = aggregate.next_seq;
        aggregate.next_seq += 1;
        aggregate.entries.insert(seq, EndpointEntry::from(obs));
        aggregate.endpoint_index.insert(key, seq);
        AggregateChange::Inserted { seq }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profile;
    use proptest::prelude::*;

    fn obs(method: &str, path: &str, query: &str, latency_ms: u64) -> Observation {
        Observation {
            profile: Profile::parse("https://a.com").unwrap(),
            method: method.to_string(),
            scheme: "https".to_string(),
            host: "a.com".to_string(),
            path: path.to_string(),
            query: query.to_string(),
            latency_ms,
        }
    }

    #[test]
    fn test_running_max() {
        let mut aggregate = ProfileAggregate::new();

        let change = EndpointAggregator::apply_in_place(&mut aggregate, &obs("GET", "/api/users", "", 120));
        assert_eq!(change, AggregateChange::Inserted { seq: 0 });

        let change = EndpointAggregator::apply_in_place(&mut aggregate, &obs("GET", "/api/users", "", 80));
        assert_eq!(change, AggregateChange::Unchanged { seq: 0 });
        assert_eq!(aggregate.get(0).unwrap().latency_ms, 120);

        let change = EndpointAggregator::apply_in_place(&mut aggregate, &obs("GET", "/api/users", "", 200));
        assert_eq!(change, AggregateChange::Raised { seq: 0, previous_ms: 120 });
        assert_eq!(aggregate.get(0).unwrap().latency_ms, 200);
        assert_eq!(aggregate.len(), 1);
        assert_eq!(aggregate.next_seq, 1);
    }

    #[test]
    fn test_key_includes_method_and_query() {
        let aggregate = ProfileAggregate::new();
        let aggregate = EndpointAggregator::apply(aggregate, &obs("GET", "/items", "?page=1", 10));
        let aggregate = EndpointAggregator::apply(aggregate, &obs("GET", "/items", "?page=2", 10));
        let aggregate = EndpointAggregator::apply(aggregate, &obs("POST", "/items", "?page=1", 10));
        // Parameter order is not normalized.
        let aggregate = EndpointAggregator::apply(aggregate, &obs("GET", "/items", "?b=1&a=2", 10));
        let aggregate = EndpointAggregator::apply(aggregate, &obs("GET", "/items", "?a=2&b=1", 10));

        assert_eq!(aggregate.len(), 5);
        assert!(aggregate.check_consistency().is_ok());
        let (seq, _) = aggregate.lookup(&EndpointKey::new("POST", "/items", "?page=1")).unwrap();
        assert_eq!(seq, 2);
    }

    #[test]
    fn test_display_metadata_fixed_at_first_seen() {
        let mut first = obs("GET", "/x", "", 5);
        first.host = "a.com".to_string();
        let mut later = obs("GET", "/x", "", 50);
        later.host = "a.com:8443".to_string();

        let aggregate = EndpointAggregator::apply(ProfileAggregate::new(), &first);
        let aggregate = EndpointAggregator::apply(aggregate, &later);

        let entry = aggregate.get(0).unwrap();
        assert_eq!(entry.host, "a.com");
        assert_eq!(entry.latency_ms, 50);
    }

    #[test]
    fn test_consistency_detects_broken_index() {
        let mut aggregate = EndpointAggregator::apply(ProfileAggregate::new(), &obs("GET", "/x", "", 5));
        assert!(aggregate.check_consistency().is_ok());

        aggregate.next_seq = 0;
        assert!(aggregate.check_consistency().is_err());

        aggregate.next_seq = 1;
        aggregate.entries.clear();
        assert!(aggregate.check_consistency().is_err());
    }

    #[test]
    fn test_dangling_index_is_replaced() {
        let mut aggregate = ProfileAggregate::new();
        aggregate.endpoint_index.insert(EndpointKey::new("GET", "/x", ""), 7);
        aggregate.next_seq = 8;

        let change = EndpointAggregator::apply_in_place(&mut aggregate, &obs("GET", "/x", "", 5));
        assert_eq!(change, AggregateChange::Inserted { seq: 8 });
        assert!(aggregate.check_consistency().is_ok());
    }

    fn observation_strategy() -> impl Strategy<Value = (usize, u64)> {
        (0usize..8, 0u64..5_000)
    }

    proptest! {
        #[test]
        fn prop_entry_count_equals_distinct_keys(samples in prop::collection::vec(observation_strategy(), 0..64)) {
            let mut aggregate = ProfileAggregate::new();
            let mut distinct = std::collections::HashSet::new();
            for (endpoint, latency) in &samples {
                let path = format!("/api/e{}", endpoint);
                distinct.insert(path.clone());
                EndpointAggregator::apply_in_place(&mut aggregate, &obs("GET", &path, "", *latency));
            }
            prop_assert_eq!(aggregate.len(), distinct.len());
            prop_assert_eq!(aggregate.next_seq as usize, distinct.len());
            prop_assert!(aggregate.check_consistency().is_ok());
        }

        #[test]
        fn prop_latency_is_running_max(samples in prop::collection::vec(observation_strategy(), 1..64)) {
            let mut aggregate = ProfileAggregate::new();
            let mut expected: std::collections::HashMap<usize, u64> = Default::default();
            for (endpoint, latency) in &samples {
                let path = format!("/e{}", endpoint);
                let key = EndpointKey::new("GET", &path, "");
                let before = aggregate.lookup(&key).map(|(_, e)| e.latency_ms);

                EndpointAggregator::apply_in_place(&mut aggregate, &obs("GET", &path, "", *latency));

                let after = aggregate.lookup(&key).map(|(_, e)| e.latency_ms).unwrap();
                if let Some(before) = before {
                    prop_assert!(after >= before);
                }
                let max = expected.entry(*endpoint).or_insert(0);
                *max = (*max).max(*latency);
            }
            for (endpoint, max) in expected {
                let key = EndpointKey::new("GET", &format!("/e{}", endpoint), "");
                prop_assert_eq!(aggregate.lookup(&key).unwrap().1.latency_ms, max);
            }
        }

        #[test]
        fn prop_apply_idempotent_at_or_below_stored(latency in 0u64..10_000, lower in 0u64..10_000) {
            let aggregate = EndpointAggregator::apply(ProfileAggregate::new(), &obs("GET", "/x", "", latency));
            let lower = lower.min(latency);
            let again = EndpointAggregator::apply(aggregate.clone(), &obs("GET", "/x", "", lower));
            prop_assert_eq!(again, aggregate);
        }

        #[test]
        fn prop_sequence_is_first_seen_order(order in prop::collection::vec(0usize..16, 1..64)) {
            let mut aggregate = ProfileAggregate::new();
            let mut first_seen: Vec<usize> = Vec::new();
            for endpoint in &order {
                if !first_seen.contains(endpoint) {
                    first_seen.push(*endpoint);
                }
                EndpointAggregator::apply_in_place(&mut aggregate, &obs("GET", &format!("/e{}", endpoint), "", 1));
            }
            for (seq, endpoint) in first_seen.iter().enumerate() {
                let key = EndpointKey::new("GET", &format!("/e{}", endpoint), "");
                prop_assert_eq!(aggregate.lookup(&key).unwrap().0, seq as u64);
            }
        }
    }
}
