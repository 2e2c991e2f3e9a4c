// src/config/ai.rs
//! Inference ladder configuration (`config/ai.json`).
//!
//! Providers are tried in file order; inside a provider, models in listed order; inside a
//! model, credentials in registration order. Secrets are never stored in the file: each
//! provider names an env prefix and keys are read from `<PREFIX>_1..=<PREFIX>_5`, falling
//! back to the bare `<PREFIX>`.

use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";
pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";
const MAX_NUMBERED_KEYS: usize = 5;

fn default_timeout_secs() -> u64 {
    35
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCfg {
    pub id: String,
    /// Free-tier models are still tried on credentials flagged as exhausted.
    #[serde(default)]
    pub free: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCfg {
    pub name: String,
    pub base_url: String,
    pub models: Vec<ModelCfg>,
    pub credentials_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Deep-pass calls get their own (longer) timeout.
    #[serde(default)]
    pub deep_timeout_secs: Option<u64>,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub site_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub providers: Vec<ProviderCfg>,
}

/// An API key plus a stable, log-safe label (`openrouter#2`).
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub label: String,
    pub secret: String,
}

impl Credential {
    pub fn new(label: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            secret: secret.into(),
        }
    }

    /// `sk-or-…1a2b` style rendering for logs.
    pub fn masked(&self) -> String {
        let s = self.secret.as_str();
        let n = s.chars().count();
        if n <= 10 {
            return "…".to_string();
        }
        let head: String = s.chars().take(6).collect();
        let tail: String = s.chars().skip(n - 4).collect();
        format!("{head}…{tail}")
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("secret", &self.masked())
            .finish()
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let m = |id: &str, free: bool| ModelCfg {
            id: id.to_string(),
            free,
        };
        Self {
            providers: vec![
                ProviderCfg {
                    name: "openrouter".into(),
                    base_url: "https://openrouter.ai/api/v1".into(),
                    models: vec![
                        m("openai/gpt-3.5-turbo", false),
                        m("openai/gpt-oss-20b:free", true),
                        m("google/gemini-2.0-flash-lite-preview-02-05:free", true),
                        m("google/gemma-3-12b-it:free", true),
                        m("mistralai/mistral-7b-instruct:free", true),
                    ],
                    credentials_env: "OPENROUTER_API_KEY".into(),
                    timeout_secs: 35,
                    deep_timeout_secs: Some(50),
                    app_name: Some("Market Impact Alerts".into()),
                    site_url: None,
                },
                ProviderCfg {
                    name: "openai".into(),
                    base_url: "https://api.openai.com/v1".into(),
                    models: vec![m("gpt-4o-mini", false)],
                    credentials_env: "OPENAI_API_KEY".into(),
                    timeout_secs: 35,
                    deep_timeout_secs: Some(50),
                    app_name: None,
                    site_url: None,
                },
            ],
        }
    }
}

impl InferenceConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: InferenceConfig = serde_json::from_str(&data)?;
        for p in &mut cfg.providers {
            p.name = p.name.trim().to_lowercase();
            p.base_url = p.base_url.trim_end_matches('/').to_string();
            if p.timeout_secs == 0 {
                p.timeout_secs = default_timeout_secs();
            }
        }
        cfg.providers.retain(|p| !p.models.is_empty());
        if cfg.providers.is_empty() {
            anyhow::bail!("inference config lists no provider with models");
        }
        Ok(cfg)
    }

    /// $AI_CONFIG_PATH, then `config/ai.json`, then built-in defaults.
    pub fn load_default() -> anyhow::Result<Self> {
        if let Ok(p) = env::var(ENV_AI_CONFIG_PATH) {
            return Self::load_from_file(p);
        }
        if Path::new(DEFAULT_AI_CONFIG_PATH).exists() {
            return Self::load_from_file(DEFAULT_AI_CONFIG_PATH);
        }
        Ok(Self::default())
    }
}

impl ProviderCfg {
    pub fn resolve_credentials(&self) -> Vec<Credential> {
        resolve_credentials_with(&self.name, &self.credentials_env, |k| env::var(k).ok())
    }
}

/// Numbered keys first (in order), bare prefix only when no numbered key exists.
pub fn resolve_credentials_with<F>(provider: &str, prefix: &str, lookup: F) -> Vec<Credential>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out: Vec<Credential> = Vec::new();
    for i in 1..=MAX_NUMBERED_KEYS {
        if let Some(v) = lookup(&format!("{prefix}_{i}")) {
            let v = v.trim();
            if !v.is_empty() && !out.iter().any(|c| c.secret == v) {
                out.push(Credential::new(format!("{provider}#{i}"), v));
            }
        }
    }
    if out.is_empty() {
        if let Some(v) = lookup(prefix) {
            let v = v.trim();
            if !v.is_empty() {
                out.push(Credential::new(format!("{provider}#0"), v));
            }
        }
    }
    out
}
