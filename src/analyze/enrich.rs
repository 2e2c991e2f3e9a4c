// src/analyze/enrich.rs
//! Pass 2: fetch the article body and ask for a deep report, merged over the candidate.
//!
//! Failure never loses the candidate: if every attempt fails the Pass-1 record comes back
//! untouched.

use chrono::Utc;
use metrics::counter;
use std::sync::Arc;

use crate::analyze::ladder::FallbackLadder;
use crate::analyze::normalize::{self, NameNormalizer};
use crate::analyze::prompt::{deep_prompt, ExampleBank, EXAMPLES_PER_PROMPT};
use crate::config::EnrichPolicy;
use crate::ingest::content::ContentFetcher;
use crate::model::{AnalysisFields, CandidateEvent, Strength};

/// Selective policy trigger.
pub const SELECTIVE_PROBABILITY: u8 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichStatus {
    Enriched,
    /// Policy did not select the candidate.
    Skipped,
    /// Selected, but every attempt failed; Pass-1 data kept.
    Failed,
}

pub struct EnrichmentEngine {
    ladder: Arc<FallbackLadder>,
    fetcher: Arc<dyn ContentFetcher>,
    normalizer: Arc<dyn NameNormalizer>,
    examples: Arc<ExampleBank>,
    policy: EnrichPolicy,
    threshold: u8,
    max_chars: usize,
}

impl EnrichmentEngine {
    pub fn new(
        ladder: Arc<FallbackLadder>,
        fetcher: Arc<dyn ContentFetcher>,
        normalizer: Arc<dyn NameNormalizer>,
        examples: Arc<ExampleBank>,
    ) -> Self {
        Self {
            ladder,
            fetcher,
            normalizer,
            examples,
            policy: EnrichPolicy::All,
            threshold: crate::store::DEFAULT_ACCEPT_THRESHOLD,
            max_chars: 4000,
        }
    }

    pub fn with_policy(mut self, policy: EnrichPolicy, threshold: u8) -> Self {
        self.policy = policy;
        self.threshold = threshold;
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn should_enrich(&self, c: &CandidateEvent) -> bool {
        match self.policy {
            EnrichPolicy::All => c.probability >= self.threshold,
            EnrichPolicy::Selective => {
                c.probability >= SELECTIVE_PROBABILITY || c.strength == Strength::High
            }
        }
    }

    pub async fn enrich(&self, mut candidate: CandidateEvent) -> (CandidateEvent, EnrichStatus) {
        if !self.should_enrich(&candidate) {
            return (candidate, EnrichStatus::Skipped);
        }

        let content = self.fetcher.fetch(&candidate.link).await;
        let examples = self.examples.relevant(&candidate.event, EXAMPLES_PER_PROMPT);
        let prompt = deep_prompt(
            &candidate.event,
            &content,
            self.max_chars,
            &examples,
            Utc::now().date_naive(),
        );

        match self.ladder.run(&prompt).await {
            Ok(success) => {
                let Ok(mut deep) = AnalysisFields::from_value(success.value) else {
                    counter!("enrich_failures_total").increment(1);
                    return (candidate, EnrichStatus::Failed);
                };
                normalize::apply(self.normalizer.as_ref(), &mut deep);
                let before = candidate.probability;
                candidate.merge(deep);
                counter!("enrich_success_total").increment(1);
                tracing::info!(
                    target: "enrich",
                    link = %candidate.link,
                    probability_before = before,
                    probability_after = candidate.probability,
                    model = %success.model,
                    "deep analysis merged"
                );
                (candidate, EnrichStatus::Enriched)
            }
            Err(e) => {
                counter!("enrich_failures_total").increment(1);
                tracing::warn!(
                    target: "enrich",
                    link = %candidate.link,
                    error = %e,
                    "deep analysis failed, keeping pass 1 data"
                );
                (candidate, EnrichStatus::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::backend::{FailureKind, InferenceBackend, InferenceFailure, Prompt};
    use crate::analyze::normalize::PassThrough;
    use crate::config::{Credential, ModelCfg};
    use crate::ingest::types::HeadlineRecord;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct Answer(Option<Value>, Mutex<Vec<String>>);

    #[async_trait]
    impl InferenceBackend for Answer {
        fn name(&self) -> &str {
            "answer"
        }
        async fn submit(&self, _m: &str, _c: &Credential, p: &Prompt) -> Result<Value, InferenceFailure> {
            self.1.lock().unwrap().push(p.user.clone());
            self.0
                .clone()
                .ok_or_else(|| InferenceFailure::new(FailureKind::Transport, "down"))
        }
    }

    struct Body;

    #[async_trait]
    impl ContentFetcher for Body {
        async fn fetch(&self, _url: &str) -> String {
            "full article text".into()
        }
    }

    fn engine(answer: Option<Value>) -> (EnrichmentEngine, Arc<Answer>) {
        let backend = Arc::new(Answer(answer, Mutex::new(Vec::new())));
        let ladder = FallbackLadder::new().with_rung(
            backend.clone(),
            vec![ModelCfg { id: "m".into(), free: true }],
            vec![Credential::new("k", "secret")],
        );
        let e = EnrichmentEngine::new(
            Arc::new(ladder),
            Arc::new(Body),
            Arc::new(PassThrough),
            Arc::new(ExampleBank::default()),
        );
        (e, backend)
    }

    fn candidate(p: u8, strength: &str) -> CandidateEvent {
        let h = HeadlineRecord::new("t", "https://n/x", "C", "2026-02-19T10:00:00Z");
        let f = AnalysisFields::from_value(json!({
            "event": "Pass one", "probability": p, "strength": strength,
            "reason": "shallow", "sector": "Energy"
        }))
        .unwrap();
        CandidateEvent::from_analysis(f, &h)
    }

    #[tokio::test]
    async fn deep_result_overwrites_present_fields_only() {
        let (e, backend) = engine(Some(json!({"probability": 40, "article_summary": "deep"})));
        let (c, status) = e.enrich(candidate(60, "low")).await;
        assert_eq!(status, EnrichStatus::Enriched);
        assert_eq!(c.probability, 40);
        assert_eq!(c.sector.as_deref(), Some("Energy"));
        assert_eq!(c.extra_str("article_summary"), Some("deep"));
        assert!(backend.1.lock().unwrap()[0].contains("full article text"));
    }

    #[tokio::test]
    async fn failure_returns_pass_one_candidate_exactly() {
        let (e, _) = engine(None);
        let original = candidate(60, "low");
        let (c, status) = e.enrich(original.clone()).await;
        assert_eq!(status, EnrichStatus::Failed);
        assert_eq!(c, original);
    }

    #[tokio::test]
    async fn below_threshold_is_not_enriched() {
        let (e, backend) = engine(Some(json!({"probability": 99})));
        let (c, status) = e.enrich(candidate(49, "high")).await;
        assert_eq!(status, EnrichStatus::Skipped);
        assert_eq!(c.probability, 49);
        assert!(backend.1.lock().unwrap().is_empty());
    }

    #[test]
    fn selective_policy_uses_seventy_or_high() {
        let (e, _) = engine(None);
        let e = e.with_policy(EnrichPolicy::Selective, 50);
        assert!(!e.should_enrich(&candidate(60, "low")));
        assert!(e.should_enrich(&candidate(70, "low")));
        assert!(e.should_enrich(&candidate(10, "high")));
    }
}
