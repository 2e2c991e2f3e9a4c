// src/model.rs
//! Event records flowing through the pipeline.
//!
//! Model output is loosely typed (probabilities as `"75%"`, stocks as a comma list, ...), so
//! it is first read into [`AnalysisFields`], a lenient partial view, and only then folded
//! into a [`CandidateEvent`] (Pass 1) or merged over one (Pass 2).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::ingest::types::HeadlineRecord;

/// `impact` value the model uses to say "nothing here".
pub const NO_IMPACT: &str = "no impact";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImpactDirection {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
    #[default]
    #[serde(rename = "NEUTRAL")]
    Neutral,
}

impl ImpactDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UP" | "POSITIVE" | "BULLISH" => Some(Self::Up),
            "DOWN" | "NEGATIVE" | "BEARISH" => Some(Self::Down),
            "NEUTRAL" | "MIXED" => Some(Self::Neutral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    #[default]
    Low,
    Medium,
    High,
}

impl Strength {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" | "strong" => Some(Self::High),
            _ => None,
        }
    }
}

/// Pass-1 output, optionally deepened by Pass 2. `id == link` always.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateEvent {
    pub event: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub stocks: Vec<String>,
    #[serde(default)]
    pub impact_direction: ImpactDirection,
    pub probability: u8,
    #[serde(default)]
    pub strength: Strength,
    #[serde(default)]
    pub reason: String,
    pub link: String,
    #[serde(default)]
    pub published: String,
    pub id: String,
    /// Everything else the model reported (impact, impact_description, event_date, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CandidateEvent {
    /// Build a candidate from a Pass-1 analysis. Identity fields come from the headline.
    pub fn from_analysis(fields: AnalysisFields, headline: &HeadlineRecord) -> Self {
        let mut c = CandidateEvent {
            event: headline.title.clone(),
            company: None,
            sector: None,
            stocks: Vec::new(),
            impact_direction: ImpactDirection::Neutral,
            probability: 0,
            strength: Strength::Low,
            reason: String::new(),
            link: headline.link.clone(),
            published: headline.published.clone(),
            id: headline.link.clone(),
            extra: BTreeMap::new(),
        };
        c.merge(fields);
        c
    }

    /// Field-level overwrite: every field present in `deep` replaces ours, absent fields are
    /// kept. Identity (`id`, `link`, `published`) is never taken from model output.
    pub fn merge(&mut self, deep: AnalysisFields) {
        if let Some(v) = deep.event {
            self.event = v;
        }
        if let Some(v) = deep.company {
            self.company = Some(v);
        }
        if let Some(v) = deep.sector {
            self.sector = Some(v);
        }
        if let Some(v) = deep.stocks {
            self.stocks = v;
        }
        if let Some(v) = deep.impact_direction {
            self.impact_direction = v;
        }
        if let Some(v) = deep.probability {
            self.probability = v;
        }
        if let Some(v) = deep.strength {
            self.strength = v;
        }
        if let Some(v) = deep.reason {
            self.reason = v;
        }
        for (k, v) in deep.extra {
            self.extra.insert(k, v);
        }
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A candidate accepted into the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRecord {
    #[serde(flatten)]
    pub candidate: CandidateEvent,
    pub timestamp: String,
    pub article_summary: String,
}

impl AlertRecord {
    /// `timestamp` is the headline's published stamp (admission time when missing);
    /// `article_summary` is the deep summary or, failing that, the reason.
    pub fn from_candidate(mut candidate: CandidateEvent, now: chrono::DateTime<chrono::Utc>) -> Self {
        let summary = candidate
            .extra
            .remove("article_summary")
            .and_then(|v| v.as_str().map(str::trim).map(str::to_string))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| candidate.reason.clone());
        for key in RECORD_KEYS {
            candidate.extra.remove(*key);
        }
        let timestamp = if candidate.published.trim().is_empty() {
            now.to_rfc3339()
        } else {
            candidate.published.clone()
        };
        Self {
            candidate,
            timestamp,
            article_summary: summary,
        }
    }

    pub fn probability(&self) -> u8 {
        self.candidate.probability
    }

    pub fn link(&self) -> &str {
        &self.candidate.link
    }
}

/// Lenient partial view of one model response. `None` means "key absent or null".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisFields {
    pub event: Option<String>,
    pub company: Option<String>,
    pub sector: Option<String>,
    pub stocks: Option<Vec<String>>,
    pub impact_direction: Option<ImpactDirection>,
    pub probability: Option<u8>,
    pub strength: Option<Strength>,
    pub reason: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

/// Keys that identify the headline and must not be overwritten by model output.
const IDENTITY_KEYS: &[&str] = &["id", "link", "published"];

/// Written by [`AlertRecord`] itself; a flattened duplicate would make the stored feed
/// unreadable.
const RECORD_KEYS: &[&str] = &["timestamp"];

impl AnalysisFields {
    /// Read a JSON object. Non-objects are a parse error.
    pub fn from_value(v: Value) -> Result<Self, String> {
        let Value::Object(map) = v else {
            return Err(format!("expected JSON object, got {}", kind_of(&v)));
        };
        Ok(Self::from_map(map))
    }

    fn from_map(map: Map<String, Value>) -> Self {
        let mut out = AnalysisFields::default();
        for (k, v) in map {
            if v.is_null() || IDENTITY_KEYS.contains(&k.as_str()) || RECORD_KEYS.contains(&k.as_str()) {
                continue;
            }
            match k.as_str() {
                "event" => out.event = non_empty_str(&v),
                "company" => out.company = non_empty_str(&v),
                "sector" => out.sector = non_empty_str(&v),
                "reason" => out.reason = non_empty_str(&v),
                "stocks" => out.stocks = parse_stocks(&v),
                "probability" => out.probability = parse_percent(&v),
                "impact_direction" => {
                    out.impact_direction = v.as_str().and_then(ImpactDirection::parse)
                }
                "strength" => out.strength = v.as_str().and_then(Strength::parse),
                "article_summary" => {
                    if let Some(summary) = non_empty_str(&v) {
                        out.extra.insert(k, Value::String(summary));
                    }
                }
                _ => {
                    out.extra.insert(k, v);
                }
            }
        }
        out
    }

    /// True when the model answered with the "no impact" sentinel.
    pub fn is_no_impact(&self) -> bool {
        self.extra
            .get("impact")
            .and_then(Value::as_str)
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(NO_IMPACT))
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn non_empty_str(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accepts 75, 75.4, "75", "75%"; clamps to 0..=100.
fn parse_percent(v: &Value) -> Option<u8> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(n.round().clamp(0.0, 100.0) as u8)
}

/// Array of strings or a comma separated string; order kept, duplicates dropped.
fn parse_stocks(v: &Value) -> Option<Vec<String>> {
    let raw: Vec<String> = match v {
        Value::Array(items) => items
            .iter()
            .filter_map(|i| i.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => return None,
    };
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for s in raw {
        let s = s.trim().to_string();
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    }
    Some(out)
}
