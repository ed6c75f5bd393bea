//! The single read/write path for durable per-profile state.
//!
//! Every read-modify-write of a [`ProfileAggregate`] runs inside a critical
//! section keyed by profile, so concurrent completions for one profile are
//! applied one after another against the latest committed value. Different
//! profiles use different locks and never wait on each other.

use crate::aggregate::ProfileAggregate;
use crate::classifier::CategoryFilter;
use crate::error::{LatencyError, Result};
use crate::profile::Profile;
use crate::retry::RetryPolicy;
use crate::store::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

pub const AGGREGATE_PREFIX: &str = "profile_logs:";
pub const FILTER_PREFIX: &str = "filter:";

pub fn aggregate_key(profile: &Profile) -> String {
    format!("{}{}", AGGREGATE_PREFIX, profile)
}

pub fn filter_key(profile: &Profile) -> String {
    format!("{}{}", FILTER_PREFIX, profile)
}

type LockRegistry = StdMutex<HashMap<Profile, Arc<Mutex<()>>>>;

/// Holds a profile's critical section. Removes the profile's lock from the
/// registry on release when nobody else is waiting for it.
struct ProfileGuard<'a> {
    registry: &'a LockRegistry,
    profile: Profile,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ProfileGuard<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            let mut locks = self.registry.lock().unwrap_or_else(|p| p.into_inner());
            let mutex = OwnedMutexGuard::mutex(&guard);
            // One reference in the registry, one in this guard.
            if Arc::strong_count(mutex) == 2 {
                if let Some(registered) = locks.get(&self.profile) {
                    if Arc::ptr_eq(registered, mutex) {
                        locks.remove(&self.profile);
                    }
                }
            }
            drop(guard);
        }
    }
}

pub struct PersistenceSerializer<S> {
    store: S,
    retry: RetryPolicy,
    locks: LockRegistry,
}

impl<S: KeyValueStore> PersistenceSerializer<S> {
    pub fn new(store: S) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    pub fn with_retry(store: S, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Atomically read, transform and write back a profile's aggregate.
    /// Returns the committed value.
    pub async fn update<F>(&self, profile: &Profile, f: F) -> Result<ProfileAggregate>
    where
        F: FnOnce(ProfileAggregate) -> ProfileAggregate,
    {
        let (aggregate, ()) = self
            .update_with(profile, |aggregate| {
                let current = std::mem::take(aggregate);
                *aggregate = f(current);
            })
            .await?;
        Ok(aggregate)
    }

    /// Like [`update`](Self::update) but mutates in place and hands back
    /// whatever the closure returns alongside the committed aggregate.
    pub async fn update_with<F, R>(&self, profile: &Profile, f: F) -> Result<(ProfileAggregate, R)>
    where
        F: FnOnce(&mut ProfileAggregate) -> R,
    {
        let _guard = self.lock(profile).await;

        let mut aggregate = self.load(profile).await?;
        let outcome = f(&mut aggregate);
        self.write(aggregate_key(profile), &aggregate).await?;

        debug!("Committed {} entries for {}", aggregate.len(), profile);
        Ok((aggregate, outcome))
    }

    /// Reset a profile to the empty aggregate, rewinding its sequence.
    pub async fn reset(&self, profile: &Profile) -> Result<()> {
        let _guard = self.lock(profile).await;
        self.write(aggregate_key(profile), &ProfileAggregate::new())
            .await?;
        info!("Reset aggregate for {}", profile);
        Ok(())
    }

    /// Read a profile's aggregate inside its critical section.
    pub async fn read(&self, profile: &Profile) -> Result<ProfileAggregate> {
        let _guard = self.lock(profile).await;
        self.load(profile).await
    }

    /// Read without taking the profile lock. The result is a committed value
    /// but may be stale by the time the caller looks at it.
    pub async fn snapshot(&self, profile: &Profile) -> Result<ProfileAggregate> {
        self.load(profile).await
    }

    pub async fn read_filter(&self, profile: &Profile) -> Result<CategoryFilter> {
        Ok(self
            .fetch::<CategoryFilter>(filter_key(profile))
            .await?
            .unwrap_or_default())
    }

    pub async fn write_filter(&self, profile: &Profile, filter: &CategoryFilter) -> Result<()> {
        self.write(filter_key(profile), filter).await
    }

    /// Profiles that have a stored aggregate, sorted.
    pub async fn profiles(&self) -> Result<Vec<Profile>> {
        let keys = self.retry.run("list keys", || self.store.keys()).await?;
        let mut profiles: Vec<Profile> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(AGGREGATE_PREFIX))
            .filter_map(Profile::parse)
            .collect();
        profiles.sort();
        profiles.dedup();
        Ok(profiles)
    }

    /// Number of profiles with a live lock. Drops back to zero when idle.
    pub fn active_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    async fn lock(&self, profile: &Profile) -> ProfileGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.entry(profile.clone()).or_default().clone()
        };
        let guard = mutex.lock_owned().await;
        ProfileGuard {
            registry: &self.locks,
            profile: profile.clone(),
            guard: Some(guard),
        }
    }

    async fn load(&self, profile: &Profile) -> Result<ProfileAggregate> {
        let key = aggregate_key(profile);
        let aggregate: ProfileAggregate = self.fetch(key.clone()).await?.unwrap_or_default();
        aggregate
            .check_consistency()
            .map_err(|reason| LatencyError::CorruptRecord { key, reason })?;
        Ok(aggregate)
    }

    async fn fetch<T: DeserializeOwned>(&self, key: String) -> Result<Option<T>> {
        let keys = [key];
        let mut values = self.retry.run("store read", || self.store.get(&keys)).await?;
        let [key] = keys;

        match values.remove(&key) {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| LatencyError::CorruptRecord {
                    key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(&self, key: String, value: &T) -> Result<()> {
        let entries = HashMap::from([(key, serde_json::to_value(value)?)]);
        self.retry
            .run("store write", || self.store.set(entries.clone()))
            .await
    }
}
