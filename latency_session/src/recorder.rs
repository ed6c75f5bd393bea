//! Drives request events through correlation, aggregation and persistence,
//! and serves the read/clear/filter operations a UI needs.

use crate::config::EngineConfig;
use crate::event::RequestEvent;
use latency_core::{
    AggregateChange, CategoryFilter, CorrelatorStats, EndpointAggregator, KeyValueStore,
    LatencyError, Observation, PersistenceSerializer, Profile, RequestCorrelator, RequestId,
    Result, StartOutcome,
};
use latency_summary::{ExportPayload, SummaryProjector, SummaryRow};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const UNAVAILABLE_MESSAGE: &str = "logging temporarily unavailable";

/// Fired after state changes so a UI can refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Committed {
        profile: Profile,
        seq: u64,
        entries: usize,
        modified: bool,
    },
    Cleared {
        profile: Profile,
    },
    Diagnostic {
        profile: Option<Profile>,
        message: String,
    },
}

/// What happened to a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Registered,
    Filtered,
    Rejected { reason: String },
    Recorded { profile: Profile, change: AggregateChange },
    Untracked,
    Dropped { profile: Profile, reason: String },
    Failed { was_tracked: bool },
}

/// Snapshot handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileLogs {
    pub profile: Profile,
    pub entries: Vec<SummaryRow>,
    pub next_seq: u64,
}

impl ProfileLogs {
    /// Rows of this snapshot that pass `filter`, in sequence order.
    pub fn filtered(&self, filter: &CategoryFilter) -> Vec<SummaryRow> {
        self.entries
            .iter()
            .filter(|row| filter.matches(row.category))
            .cloned()
            .collect()
    }
}

pub struct Recorder<S> {
    session_id: Uuid,
    correlator: Mutex<RequestCorrelator>,
    serializer: PersistenceSerializer<S>,
    notifications: broadcast::Sender<Notification>,
}

impl<S: KeyValueStore> Recorder<S> {
    pub fn new(store: S, config: &EngineConfig) -> Self {
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        let session_id = Uuid::new_v4();
        debug!("Starting interception session {}", session_id);

        Self {
            session_id,
            correlator: Mutex::new(RequestCorrelator::with_schemes(&config.schemes)),
            serializer: PersistenceSerializer::with_retry(store, config.retry.clone()),
            notifications,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub async fn handle(&self, event: RequestEvent) -> EventOutcome {
        match event {
            RequestEvent::Started {
                id,
                profile,
                method,
                url,
                time,
            } => self.on_started(id, profile.as_deref(), &method, &url, time).await,
            RequestEvent::Completed { id, time } => self.on_completed(&id, time).await,
            RequestEvent::Failed { id } => self.on_failed(&id).await,
        }
    }

    pub async fn on_started(
        &self,
        id: RequestId,
        profile: Option<&str>,
        method: &str,
        url: &str,
        time: u64,
    ) -> EventOutcome {
        let profile = match profile {
            Some(raw) => match Profile::parse(raw) {
                Some(profile) => Some(profile),
                None => {
                    return EventOutcome::Rejected {
                        reason: format!("invalid profile '{}'", raw),
                    }
                }
            },
            None => None,
        };

        let outcome = self
            .correlator
            .lock()
            .await
            .on_start(id, profile, method, url, time);

        match outcome {
            Ok(StartOutcome::Registered | StartOutcome::Replaced) => EventOutcome::Registered,
            Ok(StartOutcome::Filtered) => EventOutcome::Filtered,
            Err(e) => {
                warn!("Dropping request: {}", e);
                EventOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Correlate and record a completion.
    pub async fn on_completed(&self, id: &RequestId, time: u64) -> EventOutcome {
        match self.complete(id, time).await {
            Some(obs) => self.record(obs).await,
            None => EventOutcome::Untracked,
        }
    }

    /// Correlation half of [`on_completed`](Self::on_completed). Callers that
    /// want completions to commit concurrently correlate in event order with
    /// this and then [`record`](Self::record) on separate tasks.
    pub async fn complete(&self, id: &RequestId, time: u64) -> Option<Observation> {
        self.correlator.lock().await.on_complete(id, time)
    }

    /// Fold an observation into its profile's aggregate and commit it.
    pub async fn record(&self, obs: Observation) -> EventOutcome {
        let profile = obs.profile.clone();
        let result = self
            .serializer
            .update_with(&profile, |aggregate| {
                EndpointAggregator::apply_in_place(aggregate, &obs)
            })
            .await;

        match result {
            Ok((aggregate, change)) => {
                metrics::counter!("latency_observations_recorded_total").increment(1);
                debug!(
                    "Recorded {} {}{}{} = {}ms for {} ({:?})",
                    obs.method, obs.host, obs.path, obs.query, obs.latency_ms, profile, change
                );
                self.notify(Notification::Committed {
                    profile: profile.clone(),
                    seq: change.seq(),
                    entries: aggregate.len(),
                    modified: change.is_modified(),
                });
                EventOutcome::Recorded { profile, change }
            }
            Err(e) => {
                metrics::counter!("latency_observations_dropped_total").increment(1);
                warn!("Observation for {} not recorded: {}", profile, e);
                self.notify(Notification::Diagnostic {
                    profile: Some(profile.clone()),
                    message: diagnostic_message(&e),
                });
                EventOutcome::Dropped {
                    profile,
                    reason: e.to_string(),
                }
            }
        }
    }

    pub async fn on_failed(&self, id: &RequestId) -> EventOutcome {
        let was_tracked = self.correlator.lock().await.on_error(id);
        EventOutcome::Failed { was_tracked }
    }

    pub async fn get_profile_logs(&self, profile: &Profile) -> Result<ProfileLogs> {
        let aggregate = self.serializer.read(profile).await?;
        Ok(ProfileLogs {
            profile: profile.clone(),
            entries: SummaryProjector::list(&aggregate, &CategoryFilter::All),
            next_seq: aggregate.next_seq,
        })
    }

    pub async fn list(&self, profile: &Profile, filter: &CategoryFilter) -> Result<Vec<SummaryRow>> {
        let aggregate = self.serializer.read(profile).await?;
        Ok(SummaryProjector::list(&aggregate, filter))
    }

    pub async fn clear_logs(&self, profile: &Profile) -> Result<()> {
        self.serializer.reset(profile).await?;
        info!("Cleared logs for {}", profile);
        self.notify(Notification::Cleared {
            profile: profile.clone(),
        });
        Ok(())
    }

    /// Badge count for an explicit filter. Reads a possibly stale snapshot
    /// without waiting on in-flight updates.
    pub async fn update_badge_count(&self, profile: &Profile, filter: &CategoryFilter) -> Result<usize> {
        let aggregate = self.serializer.snapshot(profile).await?;
        Ok(SummaryProjector::count(&aggregate, filter))
    }

    /// Badge count using the profile's saved filter preference.
    pub async fn badge_count(&self, profile: &Profile) -> Result<usize> {
        let filter = self.serializer.read_filter(profile).await?;
        self.update_badge_count(profile, &filter).await
    }

    pub async fn filter(&self, profile: &Profile) -> Result<CategoryFilter> {
        self.serializer.read_filter(profile).await
    }

    pub async fn set_filter(&self, profile: &Profile, filter: CategoryFilter) -> Result<()> {
        self.serializer.write_filter(profile, &filter).await?;
        debug!("Filter for {} set to {}", profile, filter);
        Ok(())
    }

    pub async fn export(&self, profile: &Profile, filter: &CategoryFilter) -> Result<ExportPayload> {
        let aggregate = self.serializer.read(profile).await?;
        Ok(SummaryProjector::export_payload(&aggregate, filter))
    }

    pub async fn profiles(&self) -> Result<Vec<Profile>> {
        self.serializer.profiles().await
    }

    pub async fn stats(&self) -> CorrelatorStats {
        self.correlator.lock().await.stats().clone()
    }

    pub async fn in_flight(&self) -> usize {
        self.correlator.lock().await.in_flight_len()
    }

    pub async fn evict_stale(&self, now_ms: u64, max_age: Duration) -> usize {
        self.correlator.lock().await.evict_stale(now_ms, max_age)
    }

    fn notify(&self, notification: Notification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}

fn diagnostic_message(error: &LatencyError) -> String {
    if error.is_unavailable() {
        UNAVAILABLE_MESSAGE.to_string()
    } else {
        error.to_string()
    }
}

/// Milliseconds since the Unix epoch.
pub fn wall_clock_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

pub struct ReaperHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ReaperHandle {
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("Reaper task ended abnormally: {}", e);
        }
    }
}

impl<S: KeyValueStore + 'static> Recorder<S> {
    /// Periodically evict in-flight requests whose completion never arrived.
    pub fn spawn_reaper(self: &Arc<Self>, max_age: Duration, interval: Duration) -> ReaperHandle {
        self.spawn_reaper_with_clock(max_age, interval, wall_clock_ms)
    }

    pub fn spawn_reaper_with_clock<C>(
        self: &Arc<Self>,
        max_age: Duration,
        interval: Duration,
        clock: C,
    ) -> ReaperHandle
    where
        C: Fn() -> u64 + Send + 'static,
    {
        let token = CancellationToken::new();
        let recorder = Arc::clone(self);
        let cancelled = token.clone();

        if interval.is_zero() {
            debug!("Reaper disabled for session {}", self.session_id);
            return ReaperHandle {
                token,
                handle: tokio::spawn(async {}),
            };
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        recorder.evict_stale(clock(), max_age).await;
                    }
                }
            }
            debug!("Reaper for session {} stopped", recorder.session_id);
        });

        ReaperHandle { token, handle }
    }
}
