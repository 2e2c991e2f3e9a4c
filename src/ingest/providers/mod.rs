// src/ingest/providers/mod.rs
pub mod hacker_news;
pub mod news_api;
pub mod reddit;
pub mod rss;

use std::sync::Arc;
use std::time::Duration;

use crate::config::SourcesConfig;
use crate::ingest::types::SourceProvider;

use hacker_news::HackerNewsProvider;
use news_api::{NewsApiProvider, NewsDataProvider};
use reddit::RedditProvider;
use rss::RssProvider;

/// Build the provider list from config, in registration order: RSS categories first,
/// then Hacker News and Reddit, then the keyed JSON APIs. API providers without a key are left out.
pub fn build_providers(cfg: &SourcesConfig, timeout: Duration) -> Vec<Arc<dyn SourceProvider>> {
    let client = reqwest::Client::builder()
        .user_agent("market-impact-alerts/0.1")
        .connect_timeout(Duration::from_secs(4))
        .timeout(timeout)
        .build()
        .unwrap_or_default();

    let mut out: Vec<Arc<dyn SourceProvider>> = Vec::new();
    for group in &cfg.feeds {
        if group.urls.is_empty() {
            continue;
        }
        out.push(Arc::new(RssProvider::from_urls(
            &group.category,
            group.urls.clone(),
            client.clone(),
        )));
    }

    if cfg.hacker_news {
        out.push(Arc::new(HackerNewsProvider::new(client.clone())));
    }
    if cfg.reddit && !cfg.subreddits.is_empty() {
        out.push(Arc::new(RedditProvider::new(client.clone(), cfg.subreddits.clone())));
    }

    match (cfg.news_api, non_empty(&cfg.news_api_key)) {
        (true, Some(key)) => out.push(Arc::new(NewsApiProvider::new(client.clone(), key))),
        (true, None) => tracing::warn!(target: "ingest", "newsapi enabled but NEWS_API_KEY missing"),
        _ => {}
    }
    match (cfg.news_data, non_empty(&cfg.news_data_api_key)) {
        (true, Some(key)) => out.push(Arc::new(NewsDataProvider::new(client, key))),
        (true, None) => {
            tracing::warn!(target: "ingest", "newsdata enabled but NEWS_DATA_API_KEY missing")
        }
        _ => {}
    }

    out
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
