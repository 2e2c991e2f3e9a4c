// src/analyze/classify.rs
//! Pass 1: one headline in, a candidate event or a rejection out.

use chrono::Utc;
use metrics::counter;
use std::sync::Arc;

use crate::analyze::ladder::FallbackLadder;
use crate::analyze::normalize::{self, NameNormalizer};
use crate::analyze::prompt::{classification_prompt, ExampleBank, EXAMPLES_PER_PROMPT};
use crate::ingest::types::HeadlineRecord;
use crate::model::{AnalysisFields, CandidateEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The model answered with the "no impact" sentinel.
    NoImpact,
    /// Every (provider, model, credential) attempt failed, or the answer was not an object.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Candidate(CandidateEvent),
    Rejected(RejectReason),
}

pub struct ClassificationEngine {
    ladder: Arc<FallbackLadder>,
    normalizer: Arc<dyn NameNormalizer>,
    examples: Arc<ExampleBank>,
}

impl ClassificationEngine {
    pub fn new(
        ladder: Arc<FallbackLadder>,
        normalizer: Arc<dyn NameNormalizer>,
        examples: Arc<ExampleBank>,
    ) -> Self {
        Self {
            ladder,
            normalizer,
            examples,
        }
    }

    pub async fn classify(&self, headline: &HeadlineRecord) -> Classification {
        let examples = self.examples.relevant(&headline.title, EXAMPLES_PER_PROMPT);
        let prompt = classification_prompt(&headline.title, &examples, Utc::now().date_naive());

        let success = match self.ladder.run(&prompt).await {
            Ok(s) => s,
            Err(e) => {
                counter!("classify_rejected_total", "reason" => "exhausted").increment(1);
                tracing::warn!(target: "inference", link = %headline.link, error = %e, "pass 1 gave up");
                return Classification::Rejected(RejectReason::Exhausted);
            }
        };

        let mut fields = match AnalysisFields::from_value(success.value) {
            Ok(f) => f,
            Err(e) => {
                counter!("classify_rejected_total", "reason" => "unreadable").increment(1);
                tracing::warn!(target: "inference", link = %headline.link, error = %e, "pass 1 answer unreadable");
                return Classification::Rejected(RejectReason::Exhausted);
            }
        };
        if fields.is_no_impact() {
            counter!("classify_rejected_total", "reason" => "no_impact").increment(1);
            tracing::debug!(target: "inference", link = %headline.link, "no impact");
            return Classification::Rejected(RejectReason::NoImpact);
        }

        normalize::apply(self.normalizer.as_ref(), &mut fields);
        let candidate = CandidateEvent::from_analysis(fields, headline);
        counter!("classify_candidates_total").increment(1);
        tracing::info!(
            target: "inference",
            link = %candidate.link,
            event = %candidate.event,
            probability = candidate.probability,
            strength = ?candidate.strength,
            provider = %success.provider,
            model = %success.model,
            "candidate found"
        );
        Classification::Candidate(candidate)
    }
}
