// src/ingest/published.rs
//! Best-effort parsing of provider-native `published` strings.
//!
//! Feeds hand us RFC 2822 (`pubDate`), RFC 3339, `YYYY-MM-DD HH:MM:SS` (NewsData) and
//! naive ISO stamps without offset (Hacker News, produced at fetch time). Anything else is
//! `None`; callers treat `None` as "keep the item" (fail-open).

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Parse a published stamp into UTC. Naive stamps are read as UTC.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(dt) = parse_rfc2822(s) {
        return Some(dt);
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_rfc2822(s: &str) -> Option<DateTime<Utc>> {
    // chrono's parser is the fallback when `time` rejects the stamp.
    let odt = OffsetDateTime::parse(s, &Rfc2822)
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc2822(s)
                .ok()
                .and_then(|dt| OffsetDateTime::from_unix_timestamp(dt.timestamp()).ok())
        })?;
    Utc.timestamp_opt(odt.unix_timestamp(), odt.nanosecond())
        .single()
}
