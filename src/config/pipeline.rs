// src/config/pipeline.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";

/// When the deep pass runs for a Pass-1 candidate.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnrichPolicy {
    /// Every candidate at or above the accept threshold.
    #[default]
    All,
    /// Only probability >= 70 or strength == high.
    Selective,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeedGroup {
    pub category: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub feeds: Vec<FeedGroup>,
    #[serde(default = "yes")]
    pub hacker_news: bool,
    #[serde(default = "yes")]
    pub reddit: bool,
    #[serde(default = "default_subreddits")]
    pub subreddits: Vec<String>,
    #[serde(default = "yes")]
    pub news_api: bool,
    #[serde(default = "yes")]
    pub news_data: bool,
    #[serde(default)]
    pub news_api_key: Option<String>,
    #[serde(default)]
    pub news_data_api_key: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            hacker_news: true,
            reddit: true,
            subreddits: default_subreddits(),
            news_api: true,
            news_data: true,
            news_api_key: None,
            news_data_api_key: None,
        }
    }
}

fn yes() -> bool {
    true
}

fn default_subreddits() -> Vec<String> {
    crate::ingest::providers::reddit::DEFAULT_SUBREDDITS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_feeds() -> Vec<FeedGroup> {
    let gn = |q: &str| format!("https://news.google.com/rss/search?q={q}");
    vec![
        FeedGroup {
            category: "FINANCIAL MARKETS".into(),
            urls: vec![
                gn("Earnings+Reports+Stock+Market"),
                gn("Mergers+and+Acquisitions+News"),
                gn("Analyst+Ratings+Upgrades+Downgrades"),
            ],
        },
        FeedGroup {
            category: "ECONOMY & MACRO".into(),
            urls: vec![
                gn("Inflation+Interest+Rates+GDP"),
                gn("Currency+Exchange+Rates+Macroeconomics"),
            ],
        },
        FeedGroup {
            category: "CENTRAL_BANK_SPEECH".into(),
            urls: vec![
                gn("Powell+Speech+Fed+Chair+Comments"),
                gn("RBI+Governor+Speech+Monetary+Policy"),
            ],
        },
        FeedGroup {
            category: "PREMIUM NEWS".into(),
            urls: vec![
                "http://feeds.marketwatch.com/marketwatch/marketalerts".into(),
                "https://www.investing.com/rss/news_25.rss".into(),
            ],
        },
    ]
}

/// Tunables of the analysis pipeline. Everything has a default, so an absent
/// `config/pipeline.toml` yields a working setup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub batch_limit: usize,
    pub accept_threshold: u8,
    pub capacity: usize,
    pub retention_hours: i64,
    pub cold_start_admit: usize,
    pub enrich_policy: EnrichPolicy,
    pub schedule_interval_secs: u64,
    pub schedule_initial_delay_secs: u64,
    pub source_timeout_secs: u64,
    pub content_timeout_secs: u64,
    pub content_max_chars: usize,
    pub similarity_threshold: f64,
    pub liveness_url: Option<String>,
    pub liveness_interval_secs: u64,
    pub notify_url: Option<String>,
    pub sources: SourcesConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            batch_limit: 20,
            accept_threshold: 50,
            capacity: 100,
            retention_hours: 48,
            cold_start_admit: 5,
            enrich_policy: EnrichPolicy::All,
            schedule_interval_secs: 3600,
            schedule_initial_delay_secs: 5,
            source_timeout_secs: 10,
            content_timeout_secs: 15,
            content_max_chars: 4000,
            similarity_threshold: 0.85,
            liveness_url: None,
            liveness_interval_secs: 600,
            notify_url: None,
            sources: SourcesConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: PipelineConfig = toml::from_str(s).context("parsing pipeline toml")?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Resolve path from $PIPELINE_CONFIG_PATH or the default location; a missing default
    /// file means built-in defaults. Env overrides are applied last.
    pub fn load_default() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            Ok(p) => Self::load_from(Path::new(&p))?,
            Err(_) => {
                let p = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
                if p.exists() {
                    Self::load_from(&p)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("DATA_DIR") {
            if !v.trim().is_empty() {
                self.data_dir = PathBuf::from(v.trim());
            }
        }
        if let Some(v) = env_parse::<usize>("BATCH_LIMIT") {
            self.batch_limit = v;
        }
        if let Some(v) = env_parse::<u64>("SCHEDULE_INTERVAL_SECS") {
            self.schedule_interval_secs = v;
        }
        if let Ok(v) = std::env::var("LIVENESS_URL") {
            self.liveness_url = Some(v);
        }
        if let Ok(v) = std::env::var("PUSH_GATEWAY_URL") {
            self.notify_url = Some(v);
        }
        if let Ok(v) = std::env::var("NEWS_API_KEY") {
            self.sources.news_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("NEWS_DATA_API_KEY") {
            self.sources.news_data_api_key = Some(v);
        }
    }

    fn sanitize(&mut self) {
        self.accept_threshold = self.accept_threshold.min(100);
        if self.capacity == 0 {
            self.capacity = 100;
        }
        if self.batch_limit == 0 {
            self.batch_limit = 20;
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            self.similarity_threshold = 0.85;
        }
        if self.retention_hours <= 0 {
            self.retention_hours = 48;
        }
        if self.schedule_interval_secs == 0 {
            self.schedule_interval_secs = 3600;
        }
        self.liveness_url = self.liveness_url.take().filter(|u| !u.trim().is_empty());
        self.notify_url = self.notify_url.take().filter(|u| !u.trim().is_empty());
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
