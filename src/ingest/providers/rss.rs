// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::HashSet;

use crate::ingest::normalize_text;
use crate::ingest::types::{HeadlineRecord, SourceProvider};

/// Entries taken from the top of each feed.
pub const ITEMS_PER_FEED: usize = 5;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/// A category of RSS feeds (Google News queries, premium wires, Nitter accounts, ...).
pub struct RssProvider {
    name: String,
    category: String,
    mode: Mode,
}

enum Mode {
    Fixture(Vec<String>),
    Http {
        urls: Vec<String>,
        client: reqwest::Client,
    },
}

impl RssProvider {
    pub fn from_fixture(category: &str, xml: &str) -> Self {
        Self {
            name: format!("rss:{category}"),
            category: category.to_string(),
            mode: Mode::Fixture(vec![xml.to_string()]),
        }
    }

    pub fn from_urls(category: &str, urls: Vec<String>, client: reqwest::Client) -> Self {
        Self {
            name: format!("rss:{category}"),
            category: category.to_string(),
            mode: Mode::Http { urls, client },
        }
    }

    /// Parse one feed body into at most `ITEMS_PER_FEED` headlines.
    pub fn parse_feed(category: &str, xml: &str) -> Result<Vec<HeadlineRecord>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let mut out = Vec::with_capacity(ITEMS_PER_FEED);
        for it in rss.channel.item.into_iter().take(ITEMS_PER_FEED) {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let link = it.link.unwrap_or_default().trim().to_string();
            if title.is_empty() || link.is_empty() {
                continue;
            }
            out.push(HeadlineRecord {
                title,
                link,
                category: category.to_string(),
                published: it.pub_date.unwrap_or_default().trim().to_string(),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        Ok(out)
    }

    async fn fetch_url(client: &reqwest::Client, url: &str) -> Result<String> {
        let resp = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("rss get {url}"))?
            .error_for_status()
            .with_context(|| format!("rss status {url}"))?;
        resp.text().await.context("rss .text()")
    }
}

#[async_trait]
impl SourceProvider for RssProvider {
    async fn fetch_latest(&self) -> Result<Vec<HeadlineRecord>> {
        let bodies: Vec<Result<String>> = match &self.mode {
            Mode::Fixture(xmls) => xmls.iter().cloned().map(Ok).collect(),
            Mode::Http { urls, client } => {
                let futs = urls.iter().map(|u| Self::fetch_url(client, u));
                futures::future::join_all(futs).await
            }
        };

        // A broken feed inside the category is skipped; only a fully empty category
        // with errors is reported as a provider failure.
        let mut seen_titles = HashSet::new();
        let mut out = Vec::new();
        let mut errors = 0usize;
        let mut last_err = None;
        let total = bodies.len();
        for body in bodies {
            match body.and_then(|xml| Self::parse_feed(&self.category, &xml)) {
                Ok(items) => {
                    for h in items {
                        if seen_titles.insert(h.title.clone()) {
                            out.push(h);
                        }
                    }
                }
                Err(e) => {
                    errors += 1;
                    counter!("ingest_feed_errors_total").increment(1);
                    tracing::debug!(target: "ingest", provider = %self.name, error = ?e, "feed skipped");
                    last_err = Some(e);
                }
            }
        }

        if out.is_empty() && errors == total {
            if let Some(e) = last_err {
                return Err(e).context(format!("all {total} feeds failed for {}", self.name));
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
