// src/analyze/ladder.rs
//! Fallback ladder over (provider × model × credential).
//!
//! The attempt plan is a flat, ordered list built once from configuration: providers in
//! order, then models in preference order, then credentials in registration order. The
//! executor walks it and stops at the first success. The only state carried between calls
//! is the per-credential "exhausted" flag, consulted for non-free models only.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::analyze::backend::{ChatCompletionsBackend, FailureKind, InferenceBackend, InferenceFailure, Prompt};
use crate::config::{Credential, InferenceConfig, ModelCfg};

static METRICS_DESCRIBED: OnceCell<()> = OnceCell::new();

fn ensure_metrics_described() {
    METRICS_DESCRIBED.get_or_init(|| {
        describe_counter!("inference_attempts_total", "Inference attempts by provider and model.");
        describe_counter!("inference_failures_total", "Failed inference attempts by failure kind.");
        describe_counter!("inference_exhausted_total", "Requests for which every attempt failed.");
        describe_counter!("inference_skipped_total", "Attempts skipped because the credential is exhausted.");
        describe_histogram!("inference_call_ms", Unit::Milliseconds, "Latency of one inference attempt.");
    });
}

/// One provider family with its models and resolved credentials.
pub struct Rung {
    pub backend: Arc<dyn InferenceBackend>,
    pub models: Vec<ModelCfg>,
    pub credentials: Vec<Credential>,
}

/// A single planned attempt.
#[derive(Clone, Copy)]
pub struct Attempt<'a> {
    pub backend: &'a Arc<dyn InferenceBackend>,
    pub model: &'a ModelCfg,
    pub credential: &'a Credential,
}

#[derive(Debug, Clone)]
pub struct LadderSuccess {
    pub value: Value,
    pub provider: String,
    pub model: String,
    pub credential: String,
    /// 1-based index of the attempt that succeeded.
    pub attempts: usize,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("all inference attempts failed ({attempts} tried, {skipped} skipped)")]
pub struct LadderExhausted {
    pub attempts: usize,
    pub skipped: usize,
    pub last: Option<InferenceFailure>,
}

#[derive(Default)]
pub struct FallbackLadder {
    rungs: Vec<Rung>,
    exhausted: Mutex<HashSet<String>>,
}

impl FallbackLadder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider. Later providers are only reached when earlier ones are exhausted.
    pub fn with_rung(
        mut self,
        backend: Arc<dyn InferenceBackend>,
        models: Vec<ModelCfg>,
        credentials: Vec<Credential>,
    ) -> Self {
        self.rungs.push(Rung {
            backend,
            models,
            credentials,
        });
        self
    }

    /// Build from `config/ai.json`. Providers without credentials are left out.
    pub fn from_config(cfg: &InferenceConfig) -> anyhow::Result<Self> {
        let mut ladder = Self::new();
        for p in &cfg.providers {
            let credentials = p.resolve_credentials();
            if credentials.is_empty() {
                tracing::warn!(
                    target: "inference",
                    provider = %p.name,
                    env = %p.credentials_env,
                    "no credentials configured, provider skipped"
                );
                continue;
            }
            tracing::info!(
                target: "inference",
                provider = %p.name,
                models = p.models.len(),
                credentials = ?credentials.iter().map(Credential::masked).collect::<Vec<_>>(),
                "inference provider registered"
            );
            let backend = Arc::new(ChatCompletionsBackend::from_config(p)?);
            ladder = ladder.with_rung(backend, p.models.clone(), credentials);
        }
        if ladder.rungs.is_empty() {
            tracing::warn!(target: "inference", "no inference provider available; every headline will be rejected");
        }
        Ok(ladder)
    }

    pub fn is_empty(&self) -> bool {
        self.plan().is_empty()
    }

    /// Ordered attempt list (provider, then model, then credential).
    pub fn plan(&self) -> Vec<Attempt<'_>> {
        let mut out = Vec::new();
        for rung in &self.rungs {
            for model in &rung.models {
                for credential in &rung.credentials {
                    out.push(Attempt {
                        backend: &rung.backend,
                        model,
                        credential,
                    });
                }
            }
        }
        out
    }

    fn exhausted_key(provider: &str, credential: &Credential) -> String {
        format!("{provider}/{}", credential.label)
    }

    pub fn is_exhausted(&self, provider: &str, credential: &Credential) -> bool {
        let set = self.exhausted.lock().unwrap_or_else(|e| e.into_inner());
        set.contains(&Self::exhausted_key(provider, credential))
    }

    fn mark_exhausted(&self, provider: &str, credential: &Credential) {
        let mut set = self.exhausted.lock().unwrap_or_else(|e| e.into_inner());
        if set.insert(Self::exhausted_key(provider, credential)) {
            tracing::warn!(
                target: "inference",
                provider,
                credential = %credential.label,
                key = %credential.masked(),
                "credential exhausted; skipped for paid models from now on"
            );
        }
    }

    /// Walk the plan until one attempt returns a JSON object.
    pub async fn run(&self, prompt: &Prompt) -> Result<LadderSuccess, LadderExhausted> {
        ensure_metrics_described();
        let mut attempts = 0usize;
        let mut skipped = 0usize;
        let mut last: Option<InferenceFailure> = None;

        for step in self.plan() {
            let provider = step.backend.name();
            if !step.model.free && self.is_exhausted(provider, step.credential) {
                skipped += 1;
                counter!("inference_skipped_total").increment(1);
                continue;
            }
            attempts += 1;
            counter!(
                "inference_attempts_total",
                "provider" => provider.to_string(),
                "model" => step.model.id.clone()
            )
            .increment(1);

            let started = Instant::now();
            let res = step
                .backend
                .submit(&step.model.id, step.credential, prompt)
                .await;
            histogram!("inference_call_ms").record(started.elapsed().as_secs_f64() * 1000.0);

            match res {
                Ok(value) => {
                    tracing::debug!(
                        target: "inference",
                        provider,
                        model = %step.model.id,
                        credential = %step.credential.label,
                        attempts,
                        "inference succeeded"
                    );
                    return Ok(LadderSuccess {
                        value,
                        provider: provider.to_string(),
                        model: step.model.id.clone(),
                        credential: step.credential.label.clone(),
                        attempts,
                    });
                }
                Err(f) => {
                    counter!("inference_failures_total", "kind" => f.kind.as_str()).increment(1);
                    match f.kind {
                        FailureKind::QuotaExhausted => self.mark_exhausted(provider, step.credential),
                        FailureKind::NotFound => tracing::debug!(
                            target: "inference",
                            provider,
                            model = %step.model.id,
                            credential = %step.credential.label,
                            "model not available on credential"
                        ),
                        _ => tracing::warn!(
                            target: "inference",
                            provider,
                            model = %step.model.id,
                            credential = %step.credential.label,
                            kind = %f.kind,
                            detail = %f.detail,
                            "inference attempt failed"
                        ),
                    }
                    last = Some(f);
                }
            }
        }

        counter!("inference_exhausted_total").increment(1);
        tracing::warn!(target: "inference", attempts, skipped, "fallback ladder exhausted");
        Err(LadderExhausted {
            attempts,
            skipped,
            last,
        })
    }
}
