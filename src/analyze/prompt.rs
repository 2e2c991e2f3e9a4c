// src/analyze/prompt.rs
//! Prompt construction for both passes, with a few retrieved training examples inlined.

use chrono::NaiveDate;
use serde_json::Value;
use std::path::Path;

use crate::analyze::backend::Prompt;
use crate::persist::JsonDocument;

pub const EXAMPLES_PER_PROMPT: usize = 3;

/// Labelled examples (`news`, `event`, `sector`, `reason`, plus the expected output keys).
#[derive(Debug, Clone, Default)]
pub struct ExampleBank {
    examples: Vec<Value>,
}

impl ExampleBank {
    pub fn new(examples: Vec<Value>) -> Self {
        Self {
            examples: examples.into_iter().filter(Value::is_object).collect(),
        }
    }

    pub fn load(path: &Path) -> Self {
        let bank = Self::new(JsonDocument::new(path).load());
        if !bank.examples.is_empty() {
            tracing::info!(target: "inference", examples = bank.len(), "training examples loaded");
        }
        bank
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Keyword overlap: each word (> 3 chars) of `text` found inside an example's
    /// `event sector reason` scores one point. Highest scores first, ties in file order.
    pub fn relevant(&self, text: &str, limit: usize) -> Vec<&Value> {
        let mut keywords: Vec<String> = text
            .split_whitespace()
            .map(str::to_lowercase)
            .filter(|w| w.chars().count() > 3)
            .collect();
        keywords.sort();
        keywords.dedup();

        let mut scored: Vec<(usize, &Value)> = self
            .examples
            .iter()
            .map(|ex| {
                let haystack = ["event", "sector", "reason"]
                    .iter()
                    .filter_map(|k| ex.get(*k).and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase();
                let score = keywords.iter().filter(|k| haystack.contains(k.as_str())).count();
                (score, ex)
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, ex)| ex).collect()
    }
}

fn render_examples(examples: &[&Value]) -> String {
    let mut out = String::new();
    for (i, ex) in examples.iter().enumerate() {
        let news = ex.get("news").and_then(Value::as_str).unwrap_or("");
        out.push_str(&format!(
            "\nExample {}:\nNews: {}\nOutput: {}\n",
            i + 1,
            news,
            ex
        ));
    }
    out
}

/// Pass 1: headline only, answer with the event schema or `{"impact":"no impact"}`.
pub fn classification_prompt(headline: &str, examples: &[&Value], today: NaiveDate) -> Prompt {
    let user = format!(
        r#"You detect whether a news event may impact publicly traded stocks or sectors.
Analyze the news and return a structured JSON response.

RULES:
1. Identify the EVENT, COMPANY, SECTOR and IMPACT.
2. If the news is irrelevant to stocks (crime, sports, entertainment without a business angle), return {{"impact": "no impact"}}.
3. Use "NSE:SYMBOL" format for stocks if known (e.g. "NSE:RELIANCE").
4. "probability" is the confidence that the event happened (1-100).
5. "confidence" is the analysis confidence (1-100).

TRAINING EXAMPLES (relevant to this news):
{examples}

TODAY IS: {today}.

Return JSON only in this format:
{{
 "event": "Short title of the event",
 "company": "Primary Indian company (if any)",
 "sector": "Indian sector affected",
 "stocks": ["NSE:SYMBOL", ...],
 "impact_direction": "UP/DOWN/NEUTRAL",
 "impact_description": "2 sentence explanation",
 "event_date": "YYYY-MM-DD",
 "impact_date_est": "YYYY-MM-DD",
 "probability": 1-100,
 "reason": "Brief financial reasoning",
 "impact": "positive/negative/neutral",
 "strength": "low/medium/high",
 "confidence": 1-100
}}

If there is no stock impact, return {{"impact":"no impact"}}.

Headline: "{headline}""#,
        examples = render_examples(examples),
        today = today.format("%Y-%m-%d"),
        headline = headline.replace('"', "'"),
    );
    Prompt {
        user,
        json_mode: false,
        deep: false,
    }
}

/// Pass 2: headline plus the first `max_chars` characters of the article body.
pub fn deep_prompt(
    headline: &str,
    content: &str,
    max_chars: usize,
    examples: &[&Value],
    today: NaiveDate,
) -> Prompt {
    let body: String = content.chars().take(max_chars).collect();
    let user = format!(
        r#"You are a senior financial analyst focused on the Indian stock market (NSE/BSE).
Analyze the full news content below and provide a DEEP IMPACT REPORT.

RULES:
1. Focus on specific stock and sector impacts.
2. "probability" = likelihood the event happened (1-100).
3. "confidence" = your analytical confidence (1-100).
4. Use "NSE:SYMBOL" format.

TRAINING EXAMPLES (relevant to this news):
{examples}

TODAY IS: {today}.

Return JSON only in this format:
{{
 "event": "Short title",
 "article_summary": "2-3 sentence detailed summary",
 "impact_description": "Detailed reasoning on stock impact",
 "company": "Primary Indian company",
 "sector": "Primary Indian sector",
 "stocks": ["NSE:SYMBOL", ...],
 "impact_direction": "UP/DOWN/NEUTRAL",
 "probability": 1-100,
 "event_date": "YYYY-MM-DD",
 "impact_date_est": "YYYY-MM-DD",
 "impact": "positive/negative/neutral",
 "strength": "low/medium/high",
 "reason": "Technical/Financial reason"
}}

Headline: "{headline}"
Content:
"{body}""#,
        examples = render_examples(examples),
        today = today.format("%Y-%m-%d"),
        headline = headline.replace('"', "'"),
    );
    Prompt {
        user,
        json_mode: true,
        deep: true,
    }
}
