// src/ingest/types.rs
use anyhow::Result;

/// One headline as delivered by a source. `link` is the identity used for
/// deduplication across cycles; `published` is kept verbatim because feeds
/// disagree on date formats (see `ingest::published`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct HeadlineRecord {
    pub title: String,
    pub link: String,
    #[serde(alias = "source_category")]
    pub category: String, // e.g. "FINANCIAL MARKETS", "TECH & STARTUP (HN)"
    #[serde(default)]
    pub published: String,
}

impl HeadlineRecord {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        category: impl Into<String>,
        published: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            category: category.into(),
            published: published.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<HeadlineRecord>>;
    fn name(&self) -> &str;
}
