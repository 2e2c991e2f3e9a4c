// src/ingest/providers/reddit.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::types::{HeadlineRecord, SourceProvider};

const REDDIT_BASE: &str = "https://www.reddit.com";
const POSTS_PER_SUB: usize = 30;
pub const REDDIT_CATEGORY: &str = "SOCIAL: Reddit";
pub const DEFAULT_SUBREDDITS: &[&str] = &[
    "stocks",
    "WallStreetBets",
    "technology",
    "business",
    "worldnews",
    "economics",
];

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: Option<String>,
    url: Option<String>,
}

/// Hot posts from a list of subreddits. Titles are prefixed `r/<sub>: `; posts carry no
/// publish stamp, so the window keeps them fail-open and dedups them by link.
pub struct RedditProvider {
    client: reqwest::Client,
    base: String,
    subreddits: Vec<String>,
    pause: Duration,
}

impl RedditProvider {
    pub fn new(client: reqwest::Client, subreddits: Vec<String>) -> Self {
        Self {
            client,
            base: REDDIT_BASE.to_string(),
            subreddits,
            pause: Duration::from_millis(500),
        }
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }

    /// Delay between subreddit requests (reddit throttles bursts from one client).
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    async fn hot(&self, sub: &str) -> Result<Vec<HeadlineRecord>> {
        let url = format!("{}/r/{sub}/hot.json?limit={POSTS_PER_SUB}", self.base);
        let listing: Listing = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("reddit r/{sub} get()"))?
            .error_for_status()
            .with_context(|| format!("reddit r/{sub} status"))?
            .json()
            .await
            .with_context(|| format!("reddit r/{sub} json"))?;

        Ok(listing
            .data
            .children
            .into_iter()
            .filter_map(|c| match (c.data.title, c.data.url) {
                (Some(title), Some(url)) if !title.trim().is_empty() && !url.trim().is_empty() => {
                    Some(HeadlineRecord::new(format!("r/{sub}: {title}"), url, REDDIT_CATEGORY, ""))
                }
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl SourceProvider for RedditProvider {
    async fn fetch_latest(&self) -> Result<Vec<HeadlineRecord>> {
        let mut out = Vec::new();
        let mut failures = 0usize;
        for (i, sub) in self.subreddits.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            match self.hot(sub).await {
                Ok(mut posts) => out.append(&mut posts),
                Err(e) => {
                    failures += 1;
                    tracing::warn!(target: "ingest", subreddit = %sub, error = %e, "subreddit skipped");
                }
            }
        }
        if failures > 0 && failures == self.subreddits.len() {
            anyhow::bail!("all {failures} subreddits failed");
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "reddit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_shape_parses() {
        let raw = r#"{"kind":"Listing","data":{"after":null,"children":[
            {"kind":"t3","data":{"title":"Fed holds rates","url":"https://x/fed","score":10}},
            {"kind":"t3","data":{"title":"no url"}}
        ]}}"#;
        let l: Listing = serde_json::from_str(raw).unwrap();
        assert_eq!(l.data.children.len(), 2);
        assert_eq!(l.data.children[0].data.url.as_deref(), Some("https://x/fed"));
        assert!(l.data.children[1].data.url.is_none());
    }
}
