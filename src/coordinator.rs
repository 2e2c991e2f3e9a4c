// src/coordinator.rs
//! Analysis cycle orchestration.
//!
//! `AnalysisState` (alert store, processed links, scan cursor) lives inside the coordinator's
//! cycle mutex: holding the lock is the only way to touch it, so at most one cycle runs
//! process-wide. Readers (`alerts`, `status`) go through a separately published snapshot and
//! never wait on a running cycle.
//!
//! A cycle runs on its own task. Dropping the `trigger` future (a client hanging up on
//! `/refresh`) detaches the caller but never cuts the cycle short.
//!
//! Cycle order: collect → window → Pass 1 (first `batch_limit` fresh) → save processed
//! links → Pass 2 → admit + persist alerts → advance + persist cursor → notify.
//! The cursor only moves when every step up to and including the alert write succeeded.

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::analyze::{Classification, ClassificationEngine, EnrichStatus, EnrichmentEngine};
use crate::devices::RegisteredDeviceSet;
use crate::ingest::published::parse_published;
use crate::ingest::SourceAggregator;
use crate::model::AlertRecord;
use crate::notify::{self, Notifier};
use crate::persist::StateFiles;
use crate::store::AlertStore;
use crate::window::{DeduplicationWindow, ProcessedLinks, ScanCursor};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cycle_runs_total", "Analysis cycles started.");
        describe_counter!("cycle_failures_total", "Cycles aborted by an error or panic.");
        describe_counter!("cycle_busy_total", "External triggers rejected because a cycle was running.");
        describe_histogram!("cycle_duration_ms", Unit::Milliseconds, "Wall time of one cycle.");
        describe_gauge!("alerts_in_store", "Records currently in the alert store.");
        describe_gauge!("scan_cursor_ts", "Scan cursor as unix seconds.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Provenance {
    #[serde(rename = "AUTOMATED")]
    Automated,
    #[serde(rename = "USER REQUESTED")]
    UserRequested,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Automated => "AUTOMATED",
            Self::UserRequested => "USER REQUESTED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    /// Analysis finished but a state write failed; the cursor was not advanced.
    Degraded(String),
    /// Error or panic inside the cycle; the cursor was not advanced.
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub provenance: Provenance,
    pub started_at: DateTime<Utc>,
    pub fetched: usize,
    pub fresh: usize,
    pub stale: usize,
    pub duplicate: usize,
    pub forced: usize,
    pub classified: usize,
    pub deferred: usize,
    pub candidates: usize,
    pub enriched: usize,
    pub enrich_failed: usize,
    pub admitted: usize,
    pub cursor: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    fn new(provenance: Provenance, started_at: DateTime<Utc>) -> Self {
        Self {
            provenance,
            started_at,
            fetched: 0,
            fresh: 0,
            stale: 0,
            duplicate: 0,
            forced: 0,
            classified: 0,
            deferred: 0,
            candidates: 0,
            enriched: 0,
            enrich_failed: 0,
            admitted: 0,
            cursor: None,
            duration_ms: 0,
            outcome: CycleOutcome::Completed,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Accepted(CycleReport),
    Busy,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleStatus {
    pub is_running: bool,
    pub last_cursor: Option<DateTime<Utc>>,
    pub alerts: usize,
    pub last_report: Option<CycleReport>,
}

/// Everything a cycle mutates.
#[derive(Debug)]
pub struct AnalysisState {
    pub alerts: AlertStore,
    pub processed: ProcessedLinks,
    pub cursor: ScanCursor,
}

impl AnalysisState {
    pub fn load(files: &StateFiles, threshold: u8, capacity: usize) -> Self {
        let processed: ProcessedLinks = files.processed_links.load();
        let cursor: ScanCursor = files.last_scan.load();
        tracing::info!(
            target: "cycle",
            processed = processed.len(),
            cursor = ?cursor.get(),
            "analysis state loaded"
        );
        Self {
            alerts: AlertStore::load(files.alerts.clone(), threshold, capacity),
            processed,
            cursor,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    alerts: Arc<Vec<AlertRecord>>,
    cursor: Option<DateTime<Utc>>,
    last_report: Option<CycleReport>,
}

/// The stages a cycle drives.
pub struct Stages {
    pub aggregator: SourceAggregator,
    pub window: DeduplicationWindow,
    pub classifier: ClassificationEngine,
    pub enricher: EnrichmentEngine,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, Copy)]
pub struct CycleLimits {
    pub batch_limit: usize,
    pub accept_threshold: u8,
    pub retention: Duration,
}

pub struct AnalysisCoordinator {
    state: Arc<Mutex<AnalysisState>>,
    running: AtomicBool,
    snapshot: RwLock<Snapshot>,
    files: StateFiles,
    stages: Stages,
    limits: CycleLimits,
    devices: Arc<Mutex<RegisteredDeviceSet>>,
}

impl AnalysisCoordinator {
    pub fn new(
        state: AnalysisState,
        files: StateFiles,
        stages: Stages,
        limits: CycleLimits,
        devices: Arc<Mutex<RegisteredDeviceSet>>,
    ) -> Self {
        ensure_metrics_described();
        let snapshot = Snapshot {
            alerts: Arc::new(state.alerts.read().to_vec()),
            cursor: state.cursor.get(),
            last_report: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            running: AtomicBool::new(false),
            snapshot: RwLock::new(snapshot),
            files,
            stages,
            limits,
            devices,
        }
    }

    pub fn devices(&self) -> Arc<Mutex<RegisteredDeviceSet>> {
        Arc::clone(&self.devices)
    }

    /// Current alert feed, most significant first.
    pub fn alerts(&self) -> Arc<Vec<AlertRecord>> {
        Arc::clone(&self.read_snapshot().alerts)
    }

    pub fn status(&self) -> CycleStatus {
        let snap = self.read_snapshot();
        CycleStatus {
            is_running: self.running.load(Ordering::SeqCst),
            last_cursor: snap.cursor,
            alerts: snap.alerts.len(),
            last_report: snap.last_report.clone(),
        }
    }

    fn read_snapshot(&self) -> Snapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Start a cycle. User-requested triggers come from the HTTP surface and fail fast with
    /// `Busy` while another cycle holds the lock; automated triggers wait their turn.
    pub async fn trigger(self: &Arc<Self>, provenance: Provenance) -> TriggerOutcome {
        let guard = match provenance {
            Provenance::UserRequested => match Arc::clone(&self.state).try_lock_owned() {
                Ok(g) => g,
                Err(_) => {
                    counter!("cycle_busy_total").increment(1);
                    tracing::info!(target: "cycle", %provenance, "cycle already running, trigger rejected");
                    return TriggerOutcome::Busy;
                }
            },
            Provenance::Automated => Arc::clone(&self.state).lock_owned().await,
        };

        let started_at = Utc::now();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run_locked(guard, provenance, started_at).await });
        match task.await {
            Ok(report) => TriggerOutcome::Accepted(report),
            Err(e) => {
                counter!("cycle_failures_total").increment(1);
                tracing::error!(target: "cycle", %provenance, error = %e, "analysis cycle task aborted");
                TriggerOutcome::Accepted(failed_report(provenance, started_at, format!("cycle task: {e}")))
            }
        }
    }

    async fn run_locked(
        &self,
        mut guard: OwnedMutexGuard<AnalysisState>,
        provenance: Provenance,
        started_at: DateTime<Utc>,
    ) -> CycleReport {
        let _running = RunningFlag::raise(&self.running);
        counter!("cycle_runs_total").increment(1);
        let t0 = Instant::now();
        tracing::info!(target: "cycle", %provenance, "analysis cycle started");

        let result = AssertUnwindSafe(self.run_cycle(&mut guard, provenance, started_at))
            .catch_unwind()
            .await;

        let mut report = match result {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => failed_report(provenance, started_at, format!("{e:#}")),
            Err(panic) => failed_report(provenance, started_at, panic_message(panic.as_ref())),
        };
        report.duration_ms = t0.elapsed().as_millis() as u64;
        report.cursor = guard.cursor.get();
        histogram!("cycle_duration_ms").record(report.duration_ms as f64);

        match &report.outcome {
            CycleOutcome::Completed => tracing::info!(
                target: "cycle",
                %provenance,
                fetched = report.fetched,
                fresh = report.fresh,
                classified = report.classified,
                candidates = report.candidates,
                admitted = report.admitted,
                duration_ms = report.duration_ms,
                "analysis cycle finished"
            ),
            CycleOutcome::Degraded(why) => tracing::warn!(
                target: "cycle",
                %provenance,
                reason = %why,
                admitted = report.admitted,
                "analysis cycle finished degraded; cursor kept"
            ),
            CycleOutcome::Failed(why) => {
                counter!("cycle_failures_total").increment(1);
                tracing::error!(target: "cycle", %provenance, error = %why, "analysis cycle failed; cursor kept");
            }
        }

        self.publish(&guard, &report);
        report
    }

    fn publish(&self, state: &AnalysisState, report: &CycleReport) {
        let mut snap = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        snap.alerts = Arc::new(state.alerts.read().to_vec());
        snap.cursor = state.cursor.get();
        snap.last_report = Some(report.clone());
    }

    async fn run_cycle(
        &self,
        state: &mut AnalysisState,
        provenance: Provenance,
        started_at: DateTime<Utc>,
    ) -> anyhow::Result<CycleReport> {
        let mut report = CycleReport::new(provenance, started_at);
        let mut degraded: Vec<String> = Vec::new();

        // Discover + window.
        let headlines = self.stages.aggregator.collect().await;
        report.fetched = headlines.len();
        let window = self.stages.window.filter(
            &headlines,
            state.cursor.get(),
            &state.processed,
            started_at,
        );
        report.fresh = window.fresh.len();
        report.stale = window.stale + window.expired;
        report.duplicate = window.duplicate;

        let mut fresh = window.fresh;
        if fresh.is_empty() && provenance == Provenance::UserRequested && state.alerts.is_empty() {
            fresh = self.stages.window.force_admit(&headlines);
            report.forced = fresh.len();
            if !fresh.is_empty() {
                tracing::info!(target: "cycle", forced = fresh.len(), "cold start: force-admitting recent headlines");
            }
        }

        let limit = self.limits.batch_limit.min(fresh.len());
        let deferred = fresh.split_off(limit);
        let batch = fresh;
        report.deferred = deferred.len();

        // Pass 1.
        let mut candidates = Vec::new();
        for h in &batch {
            report.classified += 1;
            if let Classification::Candidate(c) = self.stages.classifier.classify(h).await {
                candidates.push(c);
            }
        }
        report.candidates = candidates.len();

        // Processed links are durable from here on, whatever happens later. Links the
        // sources still carry get their last-seen stamp refreshed so ageing never revives them.
        for h in &headlines {
            state.processed.touch(&h.link, started_at);
        }
        for h in &batch {
            state.processed.insert(&h.link, started_at);
        }
        let pruned = state
            .processed
            .prune_older_than(started_at - self.limits.retention);
        if let Err(e) = self.files.processed_links.save(&state.processed) {
            tracing::error!(target: "cycle", error = %e, "saving processed links failed");
            degraded.push(format!("processed links not saved: {e}"));
        }
        tracing::debug!(target: "cycle", processed = state.processed.len(), pruned, "processed links updated");

        // Pass 2 + acceptance.
        let mut accepted: Vec<AlertRecord> = Vec::new();
        for c in candidates {
            let (c, status) = self.stages.enricher.enrich(c).await;
            match status {
                EnrichStatus::Enriched => report.enriched += 1,
                EnrichStatus::Failed => report.enrich_failed += 1,
                EnrichStatus::Skipped => {}
            }
            if c.probability >= self.limits.accept_threshold {
                accepted.push(AlertRecord::from_candidate(c, Utc::now()));
            } else {
                tracing::debug!(target: "cycle", link = %c.link, probability = c.probability, "below threshold");
            }
        }

        // Highest probability, earliest on ties.
        let top = accepted
            .iter()
            .enumerate()
            .max_by_key(|(i, r)| (r.probability(), std::cmp::Reverse(*i)))
            .map(|(_, r)| r.clone());
        let mut store_ok = true;
        if !accepted.is_empty() {
            match state.alerts.admit(accepted) {
                Ok(n) => report.admitted = n,
                Err(e) => {
                    report.admitted = e.admitted;
                    store_ok = false;
                    degraded.push(e.to_string());
                }
            }
        }

        // Cursor: only after the alert write went through.
        if store_ok {
            let target = cursor_target(started_at, &deferred);
            if state.cursor.advance(target) {
                gauge!("scan_cursor_ts").set(target.timestamp() as f64);
                if let Err(e) = self.files.last_scan.save(&state.cursor) {
                    tracing::error!(target: "cycle", error = %e, "saving scan cursor failed");
                    degraded.push(format!("scan cursor not saved: {e}"));
                }
            }
        }

        if let Some(top) = top.filter(|_| report.admitted > 0) {
            let ids = self.devices.lock().await.ids().to_vec();
            notify::spawn_notify(Arc::clone(&self.stages.notifier), top, ids);
        }

        if !degraded.is_empty() {
            report.outcome = CycleOutcome::Degraded(degraded.join("; "));
        }
        Ok(report)
    }
}

/// Clears `running` when the cycle task ends, however it ends.
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Where the cursor may move after a successful cycle. When fresh items were deferred by
/// the batch limit the cursor stops just before the oldest dated one, so the next cycle
/// still sees it.
fn cursor_target(started_at: DateTime<Utc>, deferred: &[crate::ingest::types::HeadlineRecord]) -> DateTime<Utc> {
    deferred
        .iter()
        .filter_map(|h| parse_published(&h.published))
        .min()
        .map(|oldest| (oldest - Duration::seconds(1)).min(started_at))
        .unwrap_or(started_at)
}

fn failed_report(provenance: Provenance, started_at: DateTime<Utc>, why: String) -> CycleReport {
    let mut r = CycleReport::new(provenance, started_at);
    r.outcome = CycleOutcome::Failed(why);
    r
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::HeadlineRecord;
    use chrono::TimeZone;

    #[test]
    fn cursor_target_stops_before_oldest_deferred() {
        let start = Utc.with_ymd_and_hms(2026, 2, 19, 12, 0, 0).unwrap();
        let deferred = vec![
            HeadlineRecord::new("a", "a", "C", "2026-02-19T11:00:00Z"),
            HeadlineRecord::new("b", "b", "C", "2026-02-19T10:00:00Z"),
            HeadlineRecord::new("c", "c", "C", "garbage"),
        ];
        assert_eq!(
            cursor_target(start, &deferred),
            Utc.with_ymd_and_hms(2026, 2, 19, 9, 59, 59).unwrap()
        );
        assert_eq!(cursor_target(start, &[]), start);
    }

    #[test]
    fn provenance_labels() {
        assert_eq!(Provenance::UserRequested.to_string(), "USER REQUESTED");
        assert_eq!(
            serde_json::to_value(Provenance::Automated).unwrap(),
            serde_json::json!("AUTOMATED")
        );
    }

    #[test]
    fn panic_payloads_are_described() {
        let p: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(p.as_ref()), "panic: boom");
    }
}
