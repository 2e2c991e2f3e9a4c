// src/ingest/providers/hacker_news.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::types::{HeadlineRecord, SourceProvider};

const HN_BASE: &str = "https://hacker-news.firebaseio.com/v0";
const TOP_STORIES: usize = 20;
pub const HN_CATEGORY: &str = "TECH & STARTUP (HN)";

#[derive(Debug, Deserialize)]
struct Story {
    title: Option<String>,
    url: Option<String>,
}

/// Hacker News top stories. HN items carry no usable publish date for our purposes, so
/// every story is stamped with the fetch time.
pub struct HackerNewsProvider {
    client: reqwest::Client,
    base: String,
}

impl HackerNewsProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base: HN_BASE.to_string(),
        }
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }

    async fn story(&self, id: u64) -> Option<Story> {
        let url = format!("{}/item/{id}.json", self.base);
        let resp = self.client.get(url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<Option<Story>>().await.ok().flatten()
    }
}

#[async_trait]
impl SourceProvider for HackerNewsProvider {
    async fn fetch_latest(&self) -> Result<Vec<HeadlineRecord>> {
        let ids: Vec<u64> = self
            .client
            .get(format!("{}/topstories.json", self.base))
            .send()
            .await
            .context("hn topstories get()")?
            .error_for_status()
            .context("hn topstories status")?
            .json()
            .await
            .context("hn topstories json")?;

        let now = chrono::Utc::now().to_rfc3339();
        let stories =
            futures::future::join_all(ids.into_iter().take(TOP_STORIES).map(|id| self.story(id)))
                .await;

        Ok(stories
            .into_iter()
            .flatten()
            .filter_map(|s| match (s.title, s.url) {
                (Some(title), Some(url)) => {
                    Some(HeadlineRecord::new(title, url, HN_CATEGORY, now.clone()))
                }
                _ => None,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "hacker-news"
    }
}
