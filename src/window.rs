// src/window.rs
//! Deduplication window: the persisted scan cursor, the processed-link index and the pure
//! filter that splits a raw headline batch into fresh / stale / expired / duplicate.
//!
//! Filtering never mutates the index; the coordinator records links after classification.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::ingest::published::parse_published;
use crate::ingest::types::HeadlineRecord;

/// End of the last fully successful cycle's discovery window. Never moves backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    #[serde(default)]
    pub last_scan: Option<DateTime<Utc>>,
}

impl ScanCursor {
    pub fn at(ts: DateTime<Utc>) -> Self {
        Self {
            last_scan: Some(ts),
        }
    }

    pub fn get(&self) -> Option<DateTime<Utc>> {
        self.last_scan
    }

    /// Returns false (and keeps the old value) when `to` would move the cursor back.
    pub fn advance(&mut self, to: DateTime<Utc>) -> bool {
        match self.last_scan {
            Some(prev) if to < prev => false,
            _ => {
                self.last_scan = Some(to);
                true
            }
        }
    }
}

/// Links already submitted to Pass 1, with the last time a cycle saw them in a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedLinks {
    links: HashMap<String, DateTime<Utc>>,
}

/// On-disk forms: current (link → last seen) and the legacy plain list.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ProcessedDoc {
    Stamped(BTreeMap<String, DateTime<Utc>>),
    Legacy(Vec<String>),
}

impl Serialize for ProcessedLinks {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let sorted: BTreeMap<&String, &DateTime<Utc>> = self.links.iter().collect();
        sorted.serialize(s)
    }
}

impl<'de> Deserialize<'de> for ProcessedLinks {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let links = match ProcessedDoc::deserialize(d)? {
            ProcessedDoc::Stamped(m) => m.into_iter().collect(),
            ProcessedDoc::Legacy(v) => {
                let now = Utc::now();
                v.into_iter().map(|l| (l, now)).collect()
            }
        };
        Ok(Self { links })
    }
}

impl ProcessedLinks {
    pub fn contains(&self, link: &str) -> bool {
        self.links.contains_key(link)
    }

    /// Records `link` as seen at `now`. Returns false when it was already known, in which
    /// case only its last-seen stamp moves.
    pub fn insert(&mut self, link: &str, now: DateTime<Utc>) -> bool {
        if self.touch(link, now) {
            return false;
        }
        self.links.insert(link.to_string(), now);
        true
    }

    /// Moves the last-seen stamp of a known link forward. Unknown links are ignored.
    pub fn touch(&mut self, link: &str, now: DateTime<Utc>) -> bool {
        match self.links.get_mut(link) {
            Some(seen) => {
                *seen = (*seen).max(now);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Drop entries not seen in any feed since `cutoff`. Links still being served (undated
    /// ones included, which the time filter never expires) keep getting touched, so they
    /// stay duplicates for as long as a source carries them.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.links.len();
        self.links.retain(|_, seen| *seen >= cutoff);
        before - self.links.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Published at or before the scan cursor.
    Stale,
    /// Older than the retention horizon.
    Expired,
    /// Link already processed.
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowOutcome {
    pub fresh: Vec<HeadlineRecord>,
    pub stale: usize,
    pub expired: usize,
    pub duplicate: usize,
    /// Fresh items whose date could not be parsed (kept fail-open).
    pub unparsed: usize,
}

#[derive(Debug, Clone)]
pub struct DeduplicationWindow {
    retention: Duration,
    cold_start_admit: usize,
}

impl DeduplicationWindow {
    pub fn new(retention: Duration, cold_start_admit: usize) -> Self {
        Self {
            retention,
            cold_start_admit,
        }
    }

    /// Unparseable dates pass both time filters.
    pub fn classify(
        &self,
        h: &HeadlineRecord,
        cursor: Option<DateTime<Utc>>,
        processed: &ProcessedLinks,
        now: DateTime<Utc>,
    ) -> Freshness {
        if processed.contains(&h.link) {
            return Freshness::Duplicate;
        }
        let Some(published) = parse_published(&h.published) else {
            return Freshness::Fresh;
        };
        if published < now - self.retention {
            return Freshness::Expired;
        }
        match cursor {
            Some(c) if published <= c => Freshness::Stale,
            _ => Freshness::Fresh,
        }
    }

    pub fn filter(
        &self,
        headlines: &[HeadlineRecord],
        cursor: Option<DateTime<Utc>>,
        processed: &ProcessedLinks,
        now: DateTime<Utc>,
    ) -> WindowOutcome {
        let mut out = WindowOutcome::default();
        for h in headlines {
            match self.classify(h, cursor, processed, now) {
                Freshness::Fresh => {
                    if parse_published(&h.published).is_none() {
                        out.unparsed += 1;
                    }
                    out.fresh.push(h.clone());
                }
                Freshness::Stale => out.stale += 1,
                Freshness::Expired => out.expired += 1,
                Freshness::Duplicate => out.duplicate += 1,
            }
        }

        counter!("window_fresh_total").increment(out.fresh.len() as u64);
        counter!("window_stale_total").increment((out.stale + out.expired) as u64);
        counter!("window_duplicate_total").increment(out.duplicate as u64);
        tracing::info!(
            target: "window",
            total = headlines.len(),
            fresh = out.fresh.len(),
            stale = out.stale,
            expired = out.expired,
            duplicate = out.duplicate,
            unparsed = out.unparsed,
            "dedup window applied"
        );
        out
    }

    /// Cold-start widening: the `cold_start_admit` most recent raw headlines, newest first,
    /// ignoring cursor, retention and the processed index. Undated items sort last.
    pub fn force_admit(&self, headlines: &[HeadlineRecord]) -> Vec<HeadlineRecord> {
        let mut dated: Vec<(Option<DateTime<Utc>>, &HeadlineRecord)> = headlines
            .iter()
            .map(|h| (parse_published(&h.published), h))
            .collect();
        // Stable: equal stamps keep feed order.
        dated.sort_by(|a, b| match (a.0, b.0) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        dated
            .into_iter()
            .take(self.cold_start_admit)
            .map(|(_, h)| h.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn h(link: &str, published: &str) -> HeadlineRecord {
        HeadlineRecord::new(format!("t {link}"), link, "C", published)
    }

    #[test]
    fn cursor_is_monotonic() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 19, 9, 0, 0).unwrap();
        let mut c = ScanCursor::default();
        assert!(c.advance(t0));
        assert!(!c.advance(t0 - Duration::minutes(1)));
        assert_eq!(c.get(), Some(t0));
        assert!(c.advance(t0));
    }

    #[test]
    fn legacy_list_loads_and_new_format_roundtrips() {
        let legacy: ProcessedLinks = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert!(legacy.contains("a") && legacy.contains("b"));

        let mut p = ProcessedLinks::default();
        let t = Utc.with_ymd_and_hms(2026, 2, 19, 9, 0, 0).unwrap();
        p.insert("x", t);
        let s = serde_json::to_string(&p).unwrap();
        let back: ProcessedLinks = serde_json::from_str(&s).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn prune_drops_only_old_entries() {
        let now = Utc.with_ymd_and_hms(2026, 2, 19, 9, 0, 0).unwrap();
        let mut p = ProcessedLinks::default();
        p.insert("old", now - Duration::hours(49));
        p.insert("new", now - Duration::hours(1));
        assert_eq!(p.prune_older_than(now - Duration::hours(48)), 1);
        assert!(p.contains("new") && !p.contains("old"));
    }

    #[test]
    fn insert_and_touch_move_last_seen_forward_only() {
        let now = Utc.with_ymd_and_hms(2026, 2, 19, 9, 0, 0).unwrap();
        let mut p = ProcessedLinks::default();
        assert!(p.insert("x", now));
        assert!(!p.insert("x", now + Duration::hours(1)));
        assert_eq!(p.len(), 1);
        assert!(p.touch("x", now - Duration::hours(5)));
        assert!(!p.touch("y", now));
        assert_eq!(p.prune_older_than(now + Duration::minutes(30)), 0);
        assert!(!p.contains("y"));
    }

    #[test]
    fn classify_order_duplicate_before_time() {
        let w = DeduplicationWindow::new(Duration::hours(48), 5);
        let now = Utc.with_ymd_and_hms(2026, 2, 19, 12, 0, 0).unwrap();
        let mut p = ProcessedLinks::default();
        p.insert("A", now);
        assert_eq!(
            w.classify(&h("A", "garbage"), None, &p, now),
            Freshness::Duplicate
        );
        assert_eq!(
            w.classify(&h("B", "2026-02-10T00:00:00Z"), None, &p, now),
            Freshness::Expired
        );
        assert_eq!(
            w.classify(&h("C", "2026-02-19T08:00:00Z"), Some(now - Duration::hours(3)), &p, now),
            Freshness::Stale
        );
    }

    #[test]
    fn force_admit_newest_first_undated_last() {
        let w = DeduplicationWindow::new(Duration::hours(48), 2);
        let batch = vec![
            h("u", "nope"),
            h("old", "2026-02-18T00:00:00Z"),
            h("new", "2026-02-19T00:00:00Z"),
        ];
        let out = w.force_admit(&batch);
        let links: Vec<_> = out.iter().map(|x| x.link.as_str()).collect();
        assert_eq!(links, vec!["new", "old"]);
    }
}
