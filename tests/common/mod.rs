// tests/common/mod.rs
//
// Shared fakes for integration tests: scripted sources, a scripted inference backend,
// a static content fetcher and a recording notifier, plus a coordinator builder over a
// temp data dir.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use market_impact_alerts::analyze::{
    ClassificationEngine, EnrichmentEngine, ExampleBank, FallbackLadder, InferenceBackend,
    InferenceFailure, PassThrough, Prompt,
};
use market_impact_alerts::config::{Credential, EnrichPolicy, ModelCfg};
use market_impact_alerts::coordinator::{CycleLimits, Stages};
use market_impact_alerts::devices::RegisteredDeviceSet;
use market_impact_alerts::ingest::content::ContentFetcher;
use market_impact_alerts::ingest::SourceAggregator;
use market_impact_alerts::model::AlertRecord;
use market_impact_alerts::notify::Notifier;
use market_impact_alerts::persist::StateFiles;
use market_impact_alerts::window::DeduplicationWindow;
use market_impact_alerts::{AnalysisCoordinator, AnalysisState, HeadlineRecord, SourceProvider};

pub fn headline(title: &str, link: &str, published: &str) -> HeadlineRecord {
    HeadlineRecord::new(title, link, "TEST", published)
}

/// Returns a fixed list (or an error) every time.
pub struct FixedSource {
    pub name: String,
    pub items: Mutex<Vec<HeadlineRecord>>,
    pub fail: bool,
}

impl FixedSource {
    pub fn new(name: &str, items: Vec<HeadlineRecord>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            items: Mutex::new(items),
            fail: false,
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            items: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn set(&self, items: Vec<HeadlineRecord>) {
        *self.items.lock().unwrap() = items;
    }
}

#[async_trait]
impl SourceProvider for FixedSource {
    async fn fetch_latest(&self) -> Result<Vec<HeadlineRecord>> {
        if self.fail {
            anyhow::bail!("{} is down", self.name);
        }
        Ok(self.items.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

type Answer = dyn Fn(&Prompt) -> Result<Value, InferenceFailure> + Send + Sync;

/// Inference backend driven by a closure over the prompt. Counts calls; can be slowed down.
pub struct ScriptedBackend {
    answer: Box<Answer>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub deep_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new<F>(answer: F) -> Arc<Self>
    where
        F: Fn(&Prompt) -> Result<Value, InferenceFailure> + Send + Sync + 'static,
    {
        Arc::new(Self {
            answer: Box::new(answer),
            delay: None,
            calls: AtomicUsize::new(0),
            deep_calls: AtomicUsize::new(0),
        })
    }

    pub fn slow<F>(delay: Duration, answer: F) -> Arc<Self>
    where
        F: Fn(&Prompt) -> Result<Value, InferenceFailure> + Send + Sync + 'static,
    {
        Arc::new(Self {
            answer: Box::new(answer),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
            deep_calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn deep_calls(&self) -> usize {
        self.deep_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit(
        &self,
        _model: &str,
        _credential: &Credential,
        prompt: &Prompt,
    ) -> Result<Value, InferenceFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.deep {
            self.deep_calls.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        (self.answer)(prompt)
    }
}

/// The headline text embedded in a prompt (`Headline: "..."`).
pub fn prompt_headline(prompt: &Prompt) -> String {
    prompt
        .user
        .split("Headline: \"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap_or_default()
        .to_string()
}

pub struct StaticFetcher;

#[async_trait]
impl ContentFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> String {
        format!("Full article body for {url}")
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(AlertRecord, Vec<String>)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, top: &AlertRecord, device_ids: &[String]) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((top.clone(), device_ids.to_vec()));
        Ok(())
    }
}

impl RecordingNotifier {
    /// Notifications are spawned; poll briefly until one lands.
    pub async fn wait_for(&self, n: usize) -> Vec<(AlertRecord, Vec<String>)> {
        for _ in 0..100 {
            {
                let sent = self.sent.lock().unwrap();
                if sent.len() >= n {
                    return sent.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent.lock().unwrap().clone()
    }
}

pub struct Harness {
    pub coordinator: Arc<AnalysisCoordinator>,
    pub backend: Arc<ScriptedBackend>,
    pub notifier: Arc<RecordingNotifier>,
    pub files: StateFiles,
}

pub fn build(
    dir: &Path,
    sources: Vec<Arc<dyn SourceProvider>>,
    backend: Arc<ScriptedBackend>,
) -> Harness {
    build_with(dir, sources, backend, EnrichPolicy::All)
}

pub fn build_with(
    dir: &Path,
    sources: Vec<Arc<dyn SourceProvider>>,
    backend: Arc<ScriptedBackend>,
    policy: EnrichPolicy,
) -> Harness {
    let files = StateFiles::in_dir(dir);
    let ladder = Arc::new(FallbackLadder::new().with_rung(
        backend.clone(),
        vec![ModelCfg {
            id: "test-model".into(),
            free: true,
        }],
        vec![Credential::new("test#1", "sk-test-0000000000")],
    ));
    let examples = Arc::new(ExampleBank::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let stages = Stages {
        aggregator: SourceAggregator::new(sources, Duration::from_secs(2)),
        window: DeduplicationWindow::new(chrono::Duration::hours(48), 5),
        classifier: ClassificationEngine::new(ladder.clone(), Arc::new(PassThrough), examples.clone()),
        enricher: EnrichmentEngine::new(ladder, Arc::new(StaticFetcher), Arc::new(PassThrough), examples)
            .with_policy(policy, 50),
        notifier: notifier.clone(),
    };
    let limits = CycleLimits {
        batch_limit: 20,
        accept_threshold: 50,
        retention: chrono::Duration::hours(48),
    };
    let state = AnalysisState::load(&files, 50, 100);
    let devices = Arc::new(tokio::sync::Mutex::new(RegisteredDeviceSet::load(
        files.devices.clone(),
    )));
    let coordinator = Arc::new(AnalysisCoordinator::new(
        state,
        files.clone(),
        stages,
        limits,
        devices,
    ));
    Harness {
        coordinator,
        backend,
        notifier,
        files,
    }
}

/// RFC 3339 stamp `mins` minutes ago.
pub fn minutes_ago(mins: i64) -> String {
    (chrono::Utc::now() - chrono::Duration::minutes(mins)).to_rfc3339()
}

/// Pass-1 answer keyed off the headline: titles containing `noise` are rejected, a trailing
/// `pNN` sets the probability (default 75).
pub fn pass_one_answer(prompt: &Prompt) -> Value {
    let title = prompt_headline(prompt);
    if title.contains("noise") {
        return serde_json::json!({"impact": "no impact"});
    }
    let probability = title
        .split_whitespace()
        .filter_map(|w| w.strip_prefix('p'))
        .find_map(|n| n.parse::<u8>().ok())
        .unwrap_or(75);
    serde_json::json!({
        "company": "Acme Industries",
        "sector": "Capital Goods",
        "stocks": ["NSE:ACME"],
        "impact_direction": "UP",
        "probability": probability,
        "strength": "medium",
        "reason": "order book growth",
        "impact": "positive"
    })
}
