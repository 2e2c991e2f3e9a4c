// tests/window_dedup.rs
use chrono::{DateTime, Duration, TimeZone, Utc};

use market_impact_alerts::persist::JsonDocument;
use market_impact_alerts::window::{DeduplicationWindow, ProcessedLinks, ScanCursor};
use market_impact_alerts::HeadlineRecord;

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn window() -> DeduplicationWindow {
    DeduplicationWindow::new(Duration::hours(48), 5)
}

#[test]
fn unparseable_dates_fail_open() {
    let batch = vec![
        HeadlineRecord::new("A", "https://n/a", "C", "2026-02-19T10:00:00Z"),
        HeadlineRecord::new("B", "https://n/b", "C", "garbage"),
    ];
    let out = window().filter(
        &batch,
        Some(at("2026-02-19T09:00:00Z")),
        &ProcessedLinks::default(),
        at("2026-02-19T11:00:00Z"),
    );
    let links: Vec<_> = out.fresh.iter().map(|h| h.link.as_str()).collect();
    assert_eq!(links, vec!["https://n/a", "https://n/b"]);
    assert_eq!(out.unparsed, 1);
}

#[test]
fn filtering_twice_gives_the_same_answer() {
    let batch = vec![
        HeadlineRecord::new("A", "https://n/a", "C", "2026-02-19T10:00:00Z"),
        HeadlineRecord::new("B", "https://n/b", "C", "2026-02-19T08:00:00Z"),
        HeadlineRecord::new("C", "https://n/c", "C", "Thu, 19 Feb 2026 10:30:00 +0000"),
    ];
    let mut processed = ProcessedLinks::default();
    processed.insert("https://n/c", at("2026-02-19T10:45:00Z"));
    let cursor = Some(at("2026-02-19T09:00:00Z"));
    let now = at("2026-02-19T11:00:00Z");

    let first = window().filter(&batch, cursor, &processed, now);
    let second = window().filter(&batch, cursor, &processed, now);
    assert_eq!(first, second);
    assert_eq!(first.fresh.len(), 1);
    assert_eq!(first.stale, 1);
    assert_eq!(first.duplicate, 1);
}

#[test]
fn retention_expires_old_items_without_a_cursor() {
    let batch = vec![
        HeadlineRecord::new("old", "https://n/old", "C", "2026-02-10T10:00:00Z"),
        HeadlineRecord::new("new", "https://n/new", "C", "2026-02-19T10:00:00Z"),
    ];
    let out = window().filter(&batch, None, &ProcessedLinks::default(), at("2026-02-19T11:00:00Z"));
    assert_eq!(out.fresh.len(), 1);
    assert_eq!(out.fresh[0].title, "new");
    assert_eq!(out.expired, 1);
}

#[test]
fn processed_links_round_trip_and_accept_the_legacy_list() {
    let dir = tempfile::tempdir().unwrap();
    let doc = JsonDocument::new(dir.path().join("processed_links.json"));

    std::fs::write(doc.path(), r#"["https://n/a", "https://n/b"]"#).unwrap();
    let legacy: ProcessedLinks = doc.load();
    assert_eq!(legacy.len(), 2);
    assert!(legacy.contains("https://n/a"));

    let mut links = ProcessedLinks::default();
    let seen = Utc.with_ymd_and_hms(2026, 2, 19, 10, 0, 0).unwrap();
    links.insert("https://n/x", seen);
    doc.save(&links).unwrap();
    let back: ProcessedLinks = doc.load();
    assert_eq!(back, links);
}

#[test]
fn cursor_file_round_trips_and_never_moves_back() {
    let dir = tempfile::tempdir().unwrap();
    let doc = JsonDocument::new(dir.path().join("last_scan.json"));
    let missing: ScanCursor = doc.load();
    assert_eq!(missing.get(), None);

    let mut cursor = ScanCursor::at(at("2026-02-19T10:00:00Z"));
    assert!(!cursor.advance(at("2026-02-19T09:00:00Z")));
    assert!(cursor.advance(at("2026-02-19T12:00:00Z")));
    doc.save(&cursor).unwrap();

    let back: ScanCursor = doc.load();
    assert_eq!(back.get(), Some(at("2026-02-19T12:00:00Z")));
}

#[test]
fn undated_link_still_carried_by_a_feed_survives_ageing() {
    let t0 = at("2026-02-19T10:00:00Z");
    let undated = HeadlineRecord::new("r/stocks: Acme chatter", "https://r/acme", "SOCIAL: Reddit", "");
    let mut processed = ProcessedLinks::default();
    processed.insert(&undated.link, t0);

    // Hourly cycles keep seeing the post.
    for hour in 1..=49 {
        processed.touch(&undated.link, t0 + Duration::hours(hour));
    }
    let now = t0 + Duration::hours(49);
    processed.prune_older_than(now - Duration::hours(48));

    let out = window().filter(&[undated], None, &processed, now);
    assert_eq!(out.duplicate, 1);
    assert!(out.fresh.is_empty());
}

#[test]
fn links_gone_from_every_feed_age_out() {
    let t0 = at("2026-02-19T10:00:00Z");
    let mut processed = ProcessedLinks::default();
    processed.insert("https://n/gone", t0);
    processed.insert("https://n/kept", t0);
    processed.touch("https://n/kept", t0 + Duration::hours(30));

    assert_eq!(processed.prune_older_than(t0 + Duration::hours(49) - Duration::hours(48)), 1);
    assert!(!processed.contains("https://n/gone"));
    assert!(processed.contains("https://n/kept"));
}
