//! Market Impact Alerts service entrypoint.
//! Loads configuration, wires the analysis pipeline, starts the background scheduler and
//! serves the control surface through Shuttle/Axum.

use std::time::Duration;

use market_impact_alerts::{
    build_coordinator, create_router, init_tracing, metrics::Metrics, scheduler, AppState,
    InferenceConfig, PipelineConfig,
};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load_default()?;
    let ai = InferenceConfig::load_default()?;
    tracing::info!(
        data_dir = %cfg.data_dir.display(),
        batch_limit = cfg.batch_limit,
        accept_threshold = cfg.accept_threshold,
        capacity = cfg.capacity,
        enrich_policy = ?cfg.enrich_policy,
        "configuration loaded"
    );

    // Recorder first, so series emitted while loading state are captured.
    let metrics = Metrics::init(cfg.accept_threshold, cfg.capacity)
        .map_err(|e| tracing::warn!(error = %e, "metrics exporter not installed"))
        .ok();
    let mut state = AppState::new(build_coordinator(&cfg, &ai)?);
    if let Some(m) = metrics {
        state = state.with_metrics(m.handle);
    }

    scheduler::spawn_cycle_scheduler(
        state.coordinator.clone(),
        scheduler::ScheduleCfg {
            initial_delay: Duration::from_secs(cfg.schedule_initial_delay_secs),
            interval: Duration::from_secs(cfg.schedule_interval_secs),
        },
    );
    if let Some(url) = cfg.liveness_url.clone() {
        scheduler::spawn_liveness_probe(url, Duration::from_secs(cfg.liveness_interval_secs));
    }

    Ok(create_router(state).into())
}
