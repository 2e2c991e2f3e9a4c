// src/scheduler.rs
//! Background tasks: the periodic AUTOMATED cycle and an independent liveness ping.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;

use crate::coordinator::{AnalysisCoordinator, Provenance, TriggerOutcome};

#[derive(Clone, Copy, Debug)]
pub struct ScheduleCfg {
    pub initial_delay: Duration,
    pub interval: Duration,
}

/// Waits `initial_delay`, then runs a cycle, sleeps `interval`, repeats. Automated triggers
/// queue behind a running user cycle instead of being dropped.
pub fn spawn_cycle_scheduler(coordinator: Arc<AnalysisCoordinator>, cfg: ScheduleCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(cfg.initial_delay).await;
        loop {
            if let TriggerOutcome::Accepted(report) = coordinator.trigger(Provenance::Automated).await {
                tracing::info!(
                    target: "cycle",
                    outcome = ?report.outcome,
                    next_in_secs = cfg.interval.as_secs(),
                    "scheduled cycle done"
                );
            }
            tokio::time::sleep(cfg.interval).await;
        }
    })
}

/// GETs `url` every `interval` so hosting platforms that idle quiet services keep this one
/// awake. Never touches the cycle lock.
pub fn spawn_liveness_probe(url: String, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(Duration::from_secs(10)).build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(target: "cycle", error = %e, "liveness probe disabled");
                return;
            }
        };
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match client.get(&url).send().await {
                Ok(r) => {
                    counter!("liveness_pings_total", "ok" => r.status().is_success().to_string()).increment(1);
                    tracing::debug!(target: "cycle", status = r.status().as_u16(), "liveness ping");
                }
                Err(e) => {
                    counter!("liveness_pings_total", "ok" => "false").increment(1);
                    tracing::debug!(target: "cycle", error = %e, "liveness ping failed");
                }
            }
        }
    })
}
