// src/ingest/mod.rs
//! Source aggregation: fan out to every registered provider, isolate failures, normalize
//! titles and merge into one headline sequence keyed by `link`.

pub mod content;
pub mod providers;
pub mod published;
pub mod types;

use crate::ingest::types::{HeadlineRecord, SourceProvider};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_headlines_total",
            "Headlines returned by providers (before link dedup)."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors and timeouts."
        );
        describe_counter!(
            "ingest_link_duplicates_total",
            "Headlines dropped because another provider already returned the same link."
        );
        describe_histogram!("ingest_fetch_ms", "Provider fetch time in milliseconds.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 500 chars (headlines, not bodies)
    if out.chars().count() > 500 {
        out = out.chars().take(500).collect();
    }

    out
}

/// Drop records without a link or title and repeated links, preserving first occurrence.
/// Returns (kept, duplicates_dropped).
pub fn merge_by_link(raw: Vec<HeadlineRecord>) -> (Vec<HeadlineRecord>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut out = Vec::with_capacity(raw.len());
    let mut dup = 0usize;
    for mut h in raw {
        h.title = normalize_text(&h.title);
        h.link = h.link.trim().to_string();
        if h.link.is_empty() || h.title.is_empty() {
            continue;
        }
        if !seen.insert(h.link.clone()) {
            dup += 1;
            continue;
        }
        out.push(h);
    }
    (out, dup)
}

/// Pulls every registered provider concurrently and merges the results.
pub struct SourceAggregator {
    providers: Vec<Arc<dyn SourceProvider>>,
    timeout: Duration,
}

impl SourceAggregator {
    pub fn new(providers: Vec<Arc<dyn SourceProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Fan out, wait for all, concatenate in registration order.
    /// A provider that errors or exceeds the timeout contributes nothing.
    pub async fn collect(&self) -> Vec<HeadlineRecord> {
        ensure_metrics_described();

        let fetches = self.providers.iter().map(|p| {
            let p = Arc::clone(p);
            let timeout = self.timeout;
            async move {
                let t0 = Instant::now();
                let res = tokio::time::timeout(timeout, p.fetch_latest()).await;
                histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
                match res {
                    Ok(Ok(v)) => {
                        tracing::debug!(target: "ingest", provider = p.name(), count = v.len(), "provider ok");
                        v
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(target: "ingest", error = ?e, provider = p.name(), "provider error");
                        counter!("ingest_provider_errors_total").increment(1);
                        Vec::new()
                    }
                    Err(_) => {
                        tracing::warn!(
                            target: "ingest",
                            provider = p.name(),
                            timeout_secs = timeout.as_secs(),
                            "provider timed out"
                        );
                        counter!("ingest_provider_errors_total").increment(1);
                        Vec::new()
                    }
                }
            }
        });

        let raw: Vec<HeadlineRecord> = join_all(fetches).await.into_iter().flatten().collect();
        counter!("ingest_headlines_total").increment(raw.len() as u64);

        let (kept, dup) = merge_by_link(raw);
        counter!("ingest_link_duplicates_total").increment(dup as u64);
        tracing::info!(target: "ingest", kept = kept.len(), duplicates = dup, "sources collected");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_ws_and_entities() {
        let s = "  Sensex&nbsp;&nbsp; <b>jumps</b> 500 pts  ";
        let out = normalize_text(s);
        assert_eq!(out, "Sensex jumps 500 pts");
    }

    #[test]
    fn normalize_keeps_trailing_punctuation() {
        assert_eq!(normalize_text("Is a rate cut coming?"), "Is a rate cut coming?");
    }

    #[test]
    fn merge_keeps_first_link_and_drops_empty() {
        let raw = vec![
            HeadlineRecord::new("A", "https://x/1", "C1", ""),
            HeadlineRecord::new("A again", "https://x/1", "C2", ""),
            HeadlineRecord::new("", "https://x/2", "C1", ""),
            HeadlineRecord::new("B", "  ", "C1", ""),
            HeadlineRecord::new("C", "https://x/3", "C1", ""),
        ];
        let (kept, dup) = merge_by_link(raw);
        assert_eq!(dup, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].category, "C1");
        assert_eq!(kept[1].link, "https://x/3");
    }
}
