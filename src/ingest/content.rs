// src/ingest/content.rs
//! Full-article fetch used by the enrichment pass.
//!
//! The contract is best-effort: a fetch never fails, it returns either extracted body text or
//! a short description of what went wrong (the deep pass then works from that).

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::time::Duration;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> String;
}

pub struct HttpContentFetcher {
    client: reqwest::Client,
    max_chars: usize,
}

impl HttpContentFetcher {
    pub fn new(timeout: Duration, max_chars: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_UA)
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, max_chars })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> String {
        tracing::debug!(target: "enrich", %url, "fetching article");
        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "enrich", %url, error = %e, "article fetch failed");
                return format!("Error during fetch: {e}");
            }
        };
        let status = resp.status();
        if !status.is_success() {
            return format!("Failed to fetch content. Status: {}", status.as_u16());
        }
        match resp.text().await {
            Ok(html) => {
                let text = extract_text(&html, self.max_chars);
                if text.is_empty() {
                    "Could not extract clean text content.".to_string()
                } else {
                    text
                }
            }
            Err(e) => format!("Error reading body: {e}"),
        }
    }
}

/// Crude boilerplate removal: drop script/style/nav blocks, strip tags, decode entities,
/// collapse whitespace and cap to `max_chars` characters.
pub fn extract_text(html: &str, max_chars: usize) -> String {
    static RE_BLOCKS: OnceCell<Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();

    let re_blocks = RE_BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript|nav|header|footer|aside)\b.*?</(script|style|noscript|nav|header|footer|aside)>")
            .unwrap()
    });
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)<[^>]+>").unwrap());
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let without_blocks = re_blocks.replace_all(html, " ");
    let without_tags = re_tags.replace_all(&without_blocks, " ");
    let decoded = html_escape::decode_html_entities(&without_tags);
    let collapsed = re_ws.replace_all(&decoded, " ");
    collapsed.trim().chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_and_tags() {
        let html = r#"<html><head><style>p{color:red}</style><script>var x = 1;</script></head>
            <body><nav>Menu</nav><p>Reliance&nbsp;posts <b>record</b> profit.</p></body></html>"#;
        assert_eq!(extract_text(html, 4000), "Reliance posts record profit.");
    }

    #[test]
    fn caps_length_by_chars() {
        let html = "<p>ééééééééé</p>";
        assert_eq!(extract_text(html, 3), "ééé");
    }
}
