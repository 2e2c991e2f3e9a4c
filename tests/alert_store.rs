// tests/alert_store.rs
use chrono::Utc;
use serde_json::json;

use market_impact_alerts::model::AnalysisFields;
use market_impact_alerts::persist::JsonDocument;
use market_impact_alerts::store::AlertStore;
use market_impact_alerts::{AlertRecord, CandidateEvent, HeadlineRecord};

fn record(link: &str, probability: u8) -> AlertRecord {
    let h = HeadlineRecord::new(format!("headline {link}"), link, "MARKETS", "2026-02-19T10:00:00Z");
    let f = AnalysisFields::from_value(json!({
        "probability": probability,
        "reason": "r",
        "impact_direction": "UP"
    }))
    .unwrap();
    AlertRecord::from_candidate(CandidateEvent::from_analysis(f, &h), Utc::now())
}

fn open(dir: &tempfile::TempDir) -> AlertStore {
    AlertStore::load(JsonDocument::new(dir.path().join("alerts.json")), 50, 100)
}

#[test]
fn full_store_evicts_the_tail() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open(&dir);
    let old: Vec<_> = (0..100).map(|i| record(&format!("https://n/old-{i}"), 50)).collect();
    store.admit(old).unwrap();
    assert_eq!(store.len(), 100);

    let admitted = store.admit(vec![record("https://n/new", 90)]).unwrap();
    assert_eq!(admitted, 1);
    assert_eq!(store.len(), 100);
    assert_eq!(store.read()[0].link(), "https://n/new");
    assert!(!store.read().iter().any(|r| r.link() == "https://n/old-99"));
    assert!(store.read().iter().any(|r| r.link() == "https://n/old-98"));
}

#[test]
fn nothing_below_threshold_and_no_duplicate_links() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open(&dir);
    store
        .admit(vec![record("https://n/a", 49), record("https://n/b", 50), record("https://n/c", 77)])
        .unwrap();
    store.admit(vec![record("https://n/b", 88)]).unwrap();

    let links: Vec<_> = store.read().iter().map(|r| r.link()).collect();
    assert_eq!(links, vec!["https://n/b", "https://n/c"]);
    assert!(store.read().iter().all(|r| r.probability() >= 50));
}

#[test]
fn reload_drops_records_that_violate_current_limits() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open(&dir);
    store
        .admit(vec![record("https://n/a", 60), record("https://n/b", 80), record("https://n/c", 95)])
        .unwrap();

    let stricter = AlertStore::load(JsonDocument::new(dir.path().join("alerts.json")), 70, 1);
    assert_eq!(stricter.len(), 1);
    assert_eq!(stricter.read()[0].link(), "https://n/c");
}

#[test]
fn persisted_records_keep_the_wire_shape() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open(&dir);
    store.admit(vec![record("https://n/a", 60)]).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("alerts.json")).unwrap()).unwrap();
    let first = &raw[0];
    assert_eq!(first["link"], "https://n/a");
    assert_eq!(first["id"], "https://n/a");
    assert_eq!(first["probability"], 60);
    assert_eq!(first["timestamp"], "2026-02-19T10:00:00Z");
    assert_eq!(first["article_summary"], "r");
}

#[test]
fn admitted_ignores_pre_existing_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open(&dir);
    store.admit(vec![record("https://n/old", 90)]).unwrap();

    let admitted = store
        .admit(vec![record("https://n/new", 80), record("https://n/low", 10)])
        .unwrap();
    assert_eq!(admitted, 1);
    assert_eq!(store.admit(vec![record("https://n/low2", 20)]).unwrap(), 0);
    let links: Vec<_> = store.read().iter().map(|r| r.link()).collect();
    assert_eq!(links, vec!["https://n/new", "https://n/old"]);
}

#[test]
fn model_supplied_record_keys_do_not_break_reload() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open(&dir);
    let h = HeadlineRecord::new("Acme order", "https://n/ts", "MARKETS", "2026-02-19T10:00:00Z");
    let f = AnalysisFields::from_value(json!({
        "probability": 75,
        "reason": "r",
        "timestamp": "2026-02-19",
        "article_summary": 42
    }))
    .unwrap();
    store
        .admit(vec![AlertRecord::from_candidate(CandidateEvent::from_analysis(f, &h), Utc::now())])
        .unwrap();

    let reloaded = open(&dir);
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.read(), store.read());
    assert_eq!(reloaded.read()[0].timestamp, "2026-02-19T10:00:00Z");
    assert_eq!(reloaded.read()[0].article_summary, "r");
}
