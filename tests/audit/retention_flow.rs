use std::sync::Arc;

use conductor::audit::{AuditStore, EntryDraft, EntryFilter, Flag};
use conductor::config::RetentionConfig;
use serde_json::json;
use tempfile::TempDir;

fn retention(window: usize) -> RetentionConfig {
    RetentionConfig {
        window,
        token_budget: 10_000_000,
        ..RetentionConfig::default()
    }
}

fn open(tmp: &TempDir, window: usize) -> Arc<AuditStore> {
    Arc::new(AuditStore::open(tmp.path().join("logs"), retention(window)).unwrap())
}

#[test]
fn sliding_window_keeps_protected_and_newest_unprotected() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp, 10);

    let mut protected = Vec::new();
    let mut unprotected = Vec::new();
    for index in 0..50 {
        if index % 10 == 0 {
            let entry = store
                .append(EntryDraft::new("coordinator (llm)", "decision", format!("pin {index}")).flag(Flag::Critical))
                .unwrap();
            protected.push(entry.id);
        }
        let entry = store
            .append(EntryDraft::new("coordinator (llm)", "tool_call", format!("call {index}")))
            .unwrap();
        unprotected.push(entry.id);
    }

    let working = store.working_entries();
    assert_eq!(working.len(), 15);
    let working_ids: Vec<&str> = working.iter().map(|e| e.id.as_str()).collect();
    for id in &protected {
        assert!(working_ids.contains(&id.as_str()));
    }
    for id in &unprotected[40..] {
        assert!(working_ids.contains(&id.as_str()));
    }
    assert_eq!(store.read_raw().unwrap().len(), 55);

    // a second pass over the same store removes nothing
    assert!(store.prune_now().unwrap().is_none());
    assert_eq!(store.working_entries(), working);
}

#[test]
fn logs_round_trip_through_disk() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp, 30);
    let first = store
        .append(
            EntryDraft::new("network_capture (llm)", "headers", "key request headers")
                .payload(json!({"Referer": "https://x.test/", "note": "```fenced```"}))
                .flag(Flag::Keep),
        )
        .unwrap();
    store
        .append(EntryDraft::new("static_engine", "extract", "3 candidates").parent(first.id.clone()))
        .unwrap();

    let reopened = open(&tmp, 30);
    assert_eq!(reopened.working_entries(), store.working_entries());
    assert_eq!(reopened.read_raw().unwrap(), store.read_raw().unwrap());
    assert_eq!(reopened.working_entries()[1].parent_id.as_deref(), Some(first.id.as_str()));
}

#[test]
fn raw_only_entries_stay_out_of_the_working_log() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp, 30);
    store.append(EntryDraft::new("page_fetcher", "fetch", "fetched page")).unwrap();
    store
        .append_raw_only(EntryDraft::new("page_fetcher", "fetch_body", "<html>...</html>"))
        .unwrap();

    assert_eq!(store.working_entries().len(), 1);
    assert_eq!(store.read_raw().unwrap().len(), 2);
}

#[test]
fn queries_filter_by_agent_type_and_position() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp, 30);
    let first = store.append(EntryDraft::new("a", "note", "one")).unwrap();
    store.append(EntryDraft::new("b", "note", "two")).unwrap();
    store.append(EntryDraft::new("a", "error", "three")).unwrap();

    let filter = EntryFilter {
        agents: vec!["a".into()],
        ..EntryFilter::default()
    };
    let texts: Vec<String> = store.query(&filter, false).unwrap().into_iter().map(|e| e.text).collect();
    assert_eq!(texts, vec!["one", "three"]);

    let filter = EntryFilter {
        kinds: vec!["note".into()],
        since_id: Some(first.id),
        ..EntryFilter::default()
    };
    let texts: Vec<String> = store.query(&filter, true).unwrap().into_iter().map(|e| e.text).collect();
    assert_eq!(texts, vec!["two"]);
}

#[test]
fn token_pressure_shrinks_the_window() {
    let tmp = TempDir::new().unwrap();
    let config = RetentionConfig {
        window: 40,
        min_window: 3,
        token_budget: 1000,
        reserve_ratio: 0.0,
        ..RetentionConfig::default()
    };
    let store = Arc::new(AuditStore::open(tmp.path().join("logs"), config).unwrap());
    let bulky = "x".repeat(400);
    for index in 0..40 {
        store
            .append(EntryDraft::new("coordinator (llm)", "note", format!("{index} {bulky}")))
            .unwrap();
    }

    let working = store.working_entries();
    assert!(working.len() < 40);
    assert!(working.len() >= 3);
    assert_eq!(store.read_raw().unwrap().len(), 40);
    assert!(working.last().unwrap().text.starts_with("39 "));
}
