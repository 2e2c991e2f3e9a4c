// src/ingest/providers/news_api.rs
//! JSON headline APIs: NewsAPI (`/v2/top-headlines`) and NewsData.io (`/api/1/latest`).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::types::{HeadlineRecord, SourceProvider};

pub const NEWS_API_CATEGORY: &str = "TOP US HEADLINES (NEWSAPI)";
pub const NEWS_DATA_CATEGORY: &str = "GLOBAL LATEST (NEWSDATA)";

#[derive(Debug, Deserialize)]
struct NewsApiResp {
    #[serde(default)]
    status: String,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    title: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsDataResp {
    #[serde(default)]
    results: Vec<NewsDataResult>,
}

#[derive(Debug, Deserialize)]
struct NewsDataResult {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

pub struct NewsApiProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl NewsApiProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            url: "https://newsapi.org/v2/top-headlines?country=us".to_string(),
        }
    }

    pub fn parse(body: &str) -> Result<Vec<HeadlineRecord>> {
        let resp: NewsApiResp = serde_json::from_str(body).context("parse newsapi json")?;
        if !resp.status.is_empty() && resp.status != "ok" {
            return Err(anyhow!(
                "newsapi status {}: {}",
                resp.status,
                resp.message.unwrap_or_default()
            ));
        }
        Ok(resp
            .articles
            .into_iter()
            .filter_map(|a| match (a.title, a.url) {
                (Some(t), Some(u)) => Some(HeadlineRecord::new(
                    t,
                    u,
                    NEWS_API_CATEGORY,
                    a.published_at.unwrap_or_default(),
                )),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl SourceProvider for NewsApiProvider {
    async fn fetch_latest(&self) -> Result<Vec<HeadlineRecord>> {
        let body = self
            .client
            .get(&self.url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .context("newsapi get()")?
            .text()
            .await
            .context("newsapi .text()")?;
        Self::parse(&body)
    }

    fn name(&self) -> &str {
        "newsapi"
    }
}

pub struct NewsDataProvider {
    client: reqwest::Client,
    api_key: String,
}

impl NewsDataProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    pub fn parse(body: &str) -> Result<Vec<HeadlineRecord>> {
        let resp: NewsDataResp = serde_json::from_str(body).context("parse newsdata json")?;
        Ok(resp
            .results
            .into_iter()
            .filter_map(|r| match (r.title, r.link) {
                (Some(t), Some(l)) => Some(HeadlineRecord::new(
                    t,
                    l,
                    NEWS_DATA_CATEGORY,
                    r.pub_date.unwrap_or_default(),
                )),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl SourceProvider for NewsDataProvider {
    async fn fetch_latest(&self) -> Result<Vec<HeadlineRecord>> {
        let body = self
            .client
            .get("https://newsdata.io/api/1/latest")
            .query(&[("apikey", self.api_key.trim())])
            .send()
            .await
            .context("newsdata get()")?
            .error_for_status()
            .context("newsdata status")?
            .text()
            .await
            .context("newsdata .text()")?;
        Self::parse(&body)
    }

    fn name(&self) -> &str {
        "newsdata"
    }
}
