// src/analyze/normalize.rs
//! Company-name normalization behind a small capability trait.
//!
//! [`FuzzyRegistry`] matches against a canonical list using
//! `strsim::normalized_levenshtein` over a comparison key (lowercase, punctuation removed,
//! corporate suffixes dropped). Both the raw and the token-sorted key are scored and the
//! better score counts, so "Industries Reliance Ltd" still finds "Reliance Industries".

use std::collections::HashMap;
use std::path::Path;
use strsim::normalized_levenshtein;

use crate::model::AnalysisFields;
use crate::persist::JsonDocument;

pub const DEFAULT_SIMILARITY: f64 = 0.85;

const CORPORATE_SUFFIXES: &[&str] = &[
    "ltd", "limited", "inc", "corp", "corporation", "plc", "co", "company", "pvt", "private",
];

pub trait NameNormalizer: Send + Sync {
    /// Canonical name on a confident match, otherwise `name` unchanged.
    fn normalize(&self, name: &str) -> String;

    /// Registered ticker for a canonical name.
    fn symbol_for(&self, _canonical: &str) -> Option<String> {
        None
    }
}

/// Keeps every name verbatim.
pub struct PassThrough;

impl NameNormalizer for PassThrough {
    fn normalize(&self, name: &str) -> String {
        name.to_string()
    }
}

pub struct FuzzyRegistry {
    names: Vec<String>,
    keys: Vec<(String, String)>,
    symbols: HashMap<String, String>,
    threshold: f64,
}

impl FuzzyRegistry {
    pub fn new(names: Vec<String>, symbols: HashMap<String, String>, threshold: f64) -> Self {
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        let keys = names.iter().map(|n| comparison_keys(n)).collect();
        Self {
            names,
            keys,
            symbols,
            threshold,
        }
    }

    /// Both files are optional; a missing names list disables matching.
    pub fn load(names_path: &Path, symbols_path: &Path, threshold: f64) -> Self {
        let names: Vec<String> = JsonDocument::new(names_path).load();
        let symbols: HashMap<String, String> = JsonDocument::new(symbols_path).load();
        tracing::info!(
            target: "inference",
            names = names.len(),
            symbols = symbols.len(),
            threshold,
            "company registry loaded"
        );
        Self::new(names, symbols, threshold)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Best canonical candidate and its similarity in `0.0..=1.0`.
    pub fn best_match(&self, name: &str) -> Option<(&str, f64)> {
        let (raw, sorted) = comparison_keys(name);
        if raw.is_empty() {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for (i, (k_raw, k_sorted)) in self.keys.iter().enumerate() {
            let score = normalized_levenshtein(&raw, k_raw).max(normalized_levenshtein(&sorted, k_sorted));
            // First entry wins ties.
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        best.map(|(i, s)| (self.names[i].as_str(), s))
    }
}

impl NameNormalizer for FuzzyRegistry {
    fn normalize(&self, name: &str) -> String {
        if self.names.iter().any(|n| n == name) {
            return name.to_string();
        }
        match self.best_match(name) {
            Some((canonical, score)) if score >= self.threshold => {
                if canonical != name {
                    tracing::debug!(target: "inference", from = name, to = canonical, score, "company name corrected");
                }
                canonical.to_string()
            }
            _ => name.to_string(),
        }
    }

    fn symbol_for(&self, canonical: &str) -> Option<String> {
        self.symbols
            .get(canonical)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Replace the reported company with its canonical form and, when a symbol is registered
/// for it, make that symbol the only entry in `stocks`.
pub fn apply(normalizer: &dyn NameNormalizer, fields: &mut AnalysisFields) {
    let Some(reported) = fields.company.as_deref() else {
        return;
    };
    let canonical = normalizer.normalize(reported);
    if let Some(symbol) = normalizer.symbol_for(&canonical) {
        fields.stocks = Some(vec![symbol]);
    }
    fields.company = Some(canonical);
}

fn comparison_keys(name: &str) -> (String, String) {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    let words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| !CORPORATE_SUFFIXES.contains(w))
        .collect();
    let raw = words.join(" ");
    let mut sorted_words = words;
    sorted_words.sort_unstable();
    (raw, sorted_words.join(" "))
}
