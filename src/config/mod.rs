// src/config/mod.rs
pub mod ai;
pub mod pipeline;

pub use ai::{Credential, InferenceConfig, ModelCfg, ProviderCfg};
pub use pipeline::{EnrichPolicy, FeedGroup, PipelineConfig, SourcesConfig};
