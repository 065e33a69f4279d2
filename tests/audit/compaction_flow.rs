use std::sync::Arc;

use conductor::audit::codec::{WORKING_HEADER, render_log};
use conductor::audit::{AuditStore, EntryDraft, Flag};
use conductor::config::RetentionConfig;
use conductor::retention::{CompactionSettings, CompactionStrategy, Compactor};
use tempfile::TempDir;

use super::harness::MockService;

struct Fixture {
    _tmp: TempDir,
    store: Arc<AuditStore>,
    protected: Vec<String>,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let config = RetentionConfig {
        window: 100,
        token_budget: 10_000_000,
        ..RetentionConfig::default()
    };
    let store = Arc::new(AuditStore::open(tmp.path().join("logs"), config).unwrap());
    let mut protected = Vec::new();
    for index in 0..20 {
        if index % 7 == 0 {
            let entry = store
                .append(
                    EntryDraft::new("coordinator (llm)", "decision", format!("keep {index}"))
                        .flag(Flag::Keep),
                )
                .unwrap();
            protected.push(entry.id);
        }
        store
            .append(EntryDraft::new(
                "static_engine",
                "extract",
                format!("candidate scan {index}: {}", "y".repeat(200)),
            ))
            .unwrap();
    }
    Fixture {
        _tmp: tmp,
        store,
        protected,
    }
}

fn settings() -> CompactionSettings {
    CompactionSettings {
        max_tokens: 1,
        target_tokens: 100,
        keep_recent: 5,
        protected: vec![Flag::Keep, Flag::Critical, Flag::Decision, Flag::Error],
    }
}

#[tokio::test]
async fn invalid_reply_falls_back_to_local_summary() {
    let fx = fixture();
    let raw_before = fx.store.read_raw().unwrap().len();
    let compactor = Compactor::new(MockService::new("history_compressor", &["sure, here is a summary"]), settings());

    let report = fx.store.compact_now(Some(&compactor), true).await.unwrap().unwrap();

    assert_eq!(report.strategy, CompactionStrategy::LocalFallback);
    assert_eq!(report.replaced_count, 15);
    let working = fx.store.working_entries();
    for id in &fx.protected {
        assert!(working.iter().any(|e| &e.id == id), "protected {id} survived");
    }
    let summary = working.iter().find(|e| e.kind == "history_summary").unwrap();
    assert!(summary.has_flag(Flag::CompressLog));
    assert!(summary.text.starts_with("summary of 15 compacted entries"));
    assert!(working.iter().any(|e| e.kind == "history_compress"));
    assert!(fx.store.read_raw().unwrap().len() > raw_before);
}

#[tokio::test]
async fn protected_entries_dropped_by_the_model_are_restored() {
    let fx = fixture();
    let last = fx.store.working_entries().pop().unwrap();
    let reply = render_log(WORKING_HEADER, std::slice::from_ref(&last)).unwrap();
    let compactor = Compactor::new(MockService::new("history_compressor", &[reply.as_str()]), settings());

    let report = fx.store.compact_now(Some(&compactor), true).await.unwrap().unwrap();

    assert_eq!(report.strategy, CompactionStrategy::Model);
    let working = fx.store.working_entries();
    for id in &fx.protected {
        assert!(working.iter().any(|e| &e.id == id), "protected {id} restored");
    }
    assert!(working.iter().any(|e| e.id == last.id));
    assert!(working.iter().all(|e| e.kind != "extract" || e.id == last.id));
}

#[tokio::test]
async fn service_failure_is_not_fatal() {
    let fx = fixture();
    let compactor = Compactor::new(MockService::failing("history_compressor", "timeout"), settings());

    let report = fx.store.compact_now(Some(&compactor), true).await.unwrap().unwrap();

    assert_eq!(report.strategy, CompactionStrategy::LocalFallback);
    assert!(report.after_tokens < report.before_tokens);
}

#[tokio::test]
async fn small_logs_are_left_alone_without_force() {
    let fx = fixture();
    let compactor = Compactor::new(
        MockService::new("history_compressor", &[]),
        CompactionSettings {
            max_tokens: u64::MAX,
            ..settings()
        },
    );

    let report = fx.store.compact_now(Some(&compactor), false).await.unwrap();

    assert!(report.is_none());
}
