// src/analyze/mod.rs
//! Two-pass analysis: Pass 1 classifies headlines, Pass 2 deepens selected candidates.
//! Both passes share one [`FallbackLadder`] so credential exhaustion learned in one pass
//! is honoured by the other.

pub mod backend;
pub mod classify;
pub mod enrich;
pub mod ladder;
pub mod normalize;
pub mod prompt;

pub use backend::{FailureKind, InferenceBackend, InferenceFailure, Prompt};
pub use classify::{Classification, ClassificationEngine, RejectReason};
pub use enrich::{EnrichStatus, EnrichmentEngine};
pub use ladder::{FallbackLadder, LadderExhausted, LadderSuccess};
pub use normalize::{FuzzyRegistry, NameNormalizer, PassThrough};
pub use prompt::ExampleBank;
