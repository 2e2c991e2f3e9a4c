// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod devices;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod persist;
pub mod scheduler;
pub mod store;
pub mod window;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ---- Re-exports for a stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::{InferenceConfig, PipelineConfig};
pub use crate::coordinator::{
    AnalysisCoordinator, AnalysisState, CycleOutcome, CycleReport, CycleStatus, Provenance,
    TriggerOutcome,
};
pub use crate::ingest::types::{HeadlineRecord, SourceProvider};
pub use crate::model::{AlertRecord, CandidateEvent};

use crate::analyze::{ClassificationEngine, EnrichmentEngine, ExampleBank, FallbackLadder, FuzzyRegistry};
use crate::coordinator::{CycleLimits, Stages};
use crate::devices::RegisteredDeviceSet;
use crate::ingest::content::HttpContentFetcher;
use crate::ingest::SourceAggregator;
use crate::persist::StateFiles;
use crate::window::DeduplicationWindow;

/// Install the global subscriber. `RUST_LOG` wins over the default filter; `LOG_FORMAT=json`
/// switches to one JSON object per line. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_impact_alerts=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Wire the whole pipeline from configuration: providers, inference ladder, both passes,
/// persisted state and the notifier.
pub fn build_coordinator(
    cfg: &PipelineConfig,
    ai: &InferenceConfig,
) -> anyhow::Result<Arc<AnalysisCoordinator>> {
    let data_dir = cfg.data_dir.as_path();
    let files = StateFiles::in_dir(data_dir);

    let providers = ingest::providers::build_providers(
        &cfg.sources,
        Duration::from_secs(cfg.source_timeout_secs),
    );
    let aggregator = SourceAggregator::new(providers, Duration::from_secs(cfg.source_timeout_secs));
    tracing::info!(target: "ingest", providers = ?aggregator.provider_names(), "sources registered");

    let ladder = Arc::new(FallbackLadder::from_config(ai).context("building inference ladder")?);
    let normalizer = Arc::new(FuzzyRegistry::load(
        &data_dir.join("company_names.json"),
        &data_dir.join("company_symbols.json"),
        cfg.similarity_threshold,
    ));
    let examples = Arc::new(ExampleBank::load(&data_dir.join("training_examples.json")));
    let fetcher = Arc::new(
        HttpContentFetcher::new(
            Duration::from_secs(cfg.content_timeout_secs),
            cfg.content_max_chars,
        )
        .context("building content fetcher")?,
    );

    let classifier = ClassificationEngine::new(ladder.clone(), normalizer.clone(), examples.clone());
    let enricher = EnrichmentEngine::new(ladder, fetcher, normalizer, examples)
        .with_policy(cfg.enrich_policy, cfg.accept_threshold)
        .with_max_chars(cfg.content_max_chars);

    let stages = Stages {
        aggregator,
        window: DeduplicationWindow::new(cfg.retention(), cfg.cold_start_admit),
        classifier,
        enricher,
        notifier: notify::from_config(cfg.notify_url.as_deref()),
    };
    let limits = CycleLimits {
        batch_limit: cfg.batch_limit,
        accept_threshold: cfg.accept_threshold,
        retention: cfg.retention(),
    };

    let state = AnalysisState::load(&files, cfg.accept_threshold, cfg.capacity);
    let devices = Arc::new(Mutex::new(RegisteredDeviceSet::load(files.devices.clone())));
    Ok(Arc::new(AnalysisCoordinator::new(state, files, stages, limits, devices)))
}
