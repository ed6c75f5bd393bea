use crate::config::ReaperConfig;
use crate::event::RequestEvent;
use crate::recorder::{EventOutcome, Recorder};
use latency_core::{CorrelatorStats, KeyValueStore, Profile};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

/// Feeds a recorded event trace through a [`Recorder`].
///
/// Starts and failures are applied in trace order. Completions are correlated
/// in trace order too, then committed on their own tasks so that commits for
/// the same profile genuinely overlap.
///
/// Event timestamps drive a trace clock. Whenever it has advanced by the
/// reaper interval, in-flight requests older than `max_age` are evicted.
pub struct ReplayRunner<S> {
    recorder: Arc<Recorder<S>>,
    reaper: ReaperConfig,
}

impl<S: KeyValueStore + 'static> ReplayRunner<S> {
    pub fn new(recorder: Arc<Recorder<S>>) -> Self {
        Self {
            recorder,
            reaper: ReaperConfig::default(),
        }
    }

    pub fn with_reaper(mut self, reaper: ReaperConfig) -> Self {
        self.reaper = reaper;
        self
    }

    pub fn recorder(&self) -> &Arc<Recorder<S>> {
        &self.recorder
    }

    pub async fn run(&self, events: Vec<RequestEvent>) -> anyhow::Result<ReplayReport> {
        self.run_with_progress(events, |_| {}).await
    }

    /// `progress` is called with the number of events handled so far.
    pub async fn run_with_progress<F>(
        &self,
        events: Vec<RequestEvent>,
        mut progress: F,
    ) -> anyhow::Result<ReplayReport>
    where
        F: FnMut(usize),
    {
        info!(
            "Replaying {} events in session {}",
            events.len(),
            self.recorder.session_id()
        );
        let start_time = Instant::now();
        let mut report = ReplayReport {
            events: events.len(),
            ..Default::default()
        };
        let mut commits = JoinSet::new();
        let mut last_sweep: Option<u64> = None;

        for (index, event) in events.into_iter().enumerate() {
            if let Some(now) = event_time(&event) {
                report.evicted += self.sweep(now, &mut last_sweep).await;
            }

            match event {
                RequestEvent::Completed { id, time } => {
                    match self.recorder.complete(&id, time).await {
                        Some(obs) => {
                            let recorder = Arc::clone(&self.recorder);
                            commits.spawn(async move { recorder.record(obs).await });
                        }
                        None => report.tally(&EventOutcome::Untracked),
                    }
                }
                other => {
                    let outcome = self.recorder.handle(other).await;
                    report.tally(&outcome);
                }
            }
            progress(index + 1);
        }

        while let Some(joined) = commits.join_next().await {
            match joined {
                Ok(outcome) => report.tally(&outcome),
                Err(e) => {
                    warn!("Commit task failed: {}", e);
                    report.dropped += 1;
                }
            }
        }

        report.correlator = self.recorder.stats().await;
        report.still_in_flight = self.recorder.in_flight().await;
        report.elapsed = start_time.elapsed();

        info!(
            "Replay finished: {} recorded, {} untracked, {} dropped in {:?}",
            report.recorded, report.untracked, report.dropped, report.elapsed
        );

        Ok(report)
    }

    async fn sweep(&self, now: u64, last_sweep: &mut Option<u64>) -> usize {
        if !self.reaper.is_enabled() {
            return 0;
        }
        let interval_ms = u64::try_from(self.reaper.interval.as_millis()).unwrap_or(u64::MAX);

        match *last_sweep {
            None => {
                *last_sweep = Some(now);
                0
            }
            Some(last) if now.saturating_sub(last) >= interval_ms => {
                *last_sweep = Some(now);
                self.recorder.evict_stale(now, self.reaper.max_age).await
            }
            Some(_) => 0,
        }
    }
}

fn event_time(event: &RequestEvent) -> Option<u64> {
    match event {
        RequestEvent::Started { time, .. } | RequestEvent::Completed { time, .. } => Some(*time),
        RequestEvent::Failed { .. } => None,
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ReplayReport {
    pub events: usize,
    pub registered: usize,
    pub filtered: usize,
    pub rejected: usize,
    pub recorded: usize,
    pub untracked: usize,
    pub dropped: usize,
    pub failed: usize,
    /// In-flight requests dropped by the reaper.
    pub evicted: usize,
    pub still_in_flight: usize,
    pub profiles: BTreeSet<Profile>,
    pub correlator: CorrelatorStats,
    #[serde(with = "latency_core::retry::humantime_serde")]
    pub elapsed: Duration,
}

impl ReplayReport {
    fn tally(&mut self, outcome: &EventOutcome) {
        match outcome {
            EventOutcome::Registered => self.registered += 1,
            EventOutcome::Filtered => self.filtered += 1,
            EventOutcome::Rejected { .. } => self.rejected += 1,
            EventOutcome::Recorded { profile, .. } => {
                self.recorded += 1;
                self.profiles.insert(profile.clone());
            }
            EventOutcome::Untracked => self.untracked += 1,
            EventOutcome::Dropped { .. } => self.dropped += 1,
            EventOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Share of completions that made it into the store.
    pub fn record_rate(&self) -> f64 {
        let completions = self.recorded + self.dropped;
        if completions == 0 {
            return 0.0;
        }
        self.recorded as f64 / completions as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::parser::parse_trace_from_str;
    use latency_core::MemoryStore;

    const TRACE: &str = r#"
{"event":"started","id":"1","method":"GET","url":"https://a.com/api/users","time":0}
{"event":"started","id":"2","method":"GET","url":"https://a.com/app.js","time":5}
{"event":"started","id":"3","method":"GET","url":"https://a.com/api/users","time":10}
{"event":"started","id":"4","method":"GET","url":"https://b.com/logo.png","time":10}
{"event":"started","id":"5","method":"GET","url":"chrome://settings","time":10}
{"event":"completed","id":"3","time":210}
{"event":"completed","id":"1","time":120}
{"event":"failed","id":"2"}
{"event":"completed","id":"2","time":50}
{"event":"completed","id":"4","time":30}
{"event":"completed","id":"99","time":30}
"#;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_replay_trace() {
        let recorder = Arc::new(Recorder::new(MemoryStore::new(), &EngineConfig::default()));
        let runner = ReplayRunner::new(recorder.clone());
        let events = parse_trace_from_str(TRACE, "jsonl").unwrap();

        let mut seen = 0;
        let report = runner
            .run_with_progress(events, |n| seen = n)
            .await
            .unwrap();

        assert_eq!(seen, 11);
        assert_eq!(report.events, 11);
        assert_eq!(report.registered, 4);
        assert_eq!(report.filtered, 1);
        assert_eq!(report.recorded, 3);
        assert_eq!(report.untracked, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.still_in_flight, 0);
        assert_eq!(report.profiles.len(), 2);
        assert_eq!(report.record_rate(), 1.0);

        let a = Profile::parse("https://a.com").unwrap();
        let logs = recorder.get_profile_logs(&a).await.unwrap();
        assert_eq!(logs.entries.len(), 1);
        assert_eq!(logs.entries[0].entry.latency_ms, 200);
    }

    const LOST_COMPLETION: &str = r#"
{"event":"started","id":"lost","method":"GET","url":"https://a.com/api/slow","time":0}
{"event":"started","id":"2","method":"GET","url":"https://a.com/app.js","time":400000}
{"event":"completed","id":"2","time":400100}
{"event":"completed","id":"lost","time":400200}
"#;

    #[tokio::test]
    async fn test_replay_evicts_lost_completion() {
        let recorder = Arc::new(Recorder::new(MemoryStore::new(), &EngineConfig::default()));
        let runner = ReplayRunner::new(recorder.clone()).with_reaper(ReaperConfig {
            max_age: Duration::from_secs(300),
            interval: Duration::from_secs(30),
        });
        let events = parse_trace_from_str(LOST_COMPLETION, "jsonl").unwrap();

        let report = runner.run(events).await.unwrap();

        assert_eq!(report.evicted, 1);
        assert_eq!(report.correlator.evicted, 1);
        assert_eq!(report.recorded, 1);
        assert_eq!(report.untracked, 1);
        assert_eq!(report.still_in_flight, 0);
    }

    #[tokio::test]
    async fn test_replay_without_reaper_keeps_lost_request() {
        let recorder = Arc::new(Recorder::new(MemoryStore::new(), &EngineConfig::default()));
        let runner = ReplayRunner::new(recorder.clone()).with_reaper(ReaperConfig {
            max_age: Duration::from_secs(300),
            interval: Duration::ZERO,
        });
        let events = parse_trace_from_str(LOST_COMPLETION, "jsonl").unwrap();

        let report = runner.run(events).await.unwrap();

        assert_eq!(report.evicted, 0);
        assert_eq!(report.recorded, 2);
        assert_eq!(report.still_in_flight, 0);
    }

    #[test]
    fn test_record_rate_without_completions() {
        assert_eq!(ReplayReport::default().record_rate(), 0.0);
    }
}
