use std::sync::Arc;

use conductor::audit::agents;
use conductor::capabilities::TaskInput;
use conductor::session::{RunOutcome, run_session};
use serde_json::json;
use tempfile::TempDir;

use super::harness::{MockService, no_progress, services, workspace};

const PAGE: &str = r#"<html><video src="https://cdn.x/master.m3u8"></video></html>"#;

fn static_code() -> String {
    "function extract(html) {\n  const m = html.match(/https:[^\"']+\\.m3u8/);\n  return m ? [m[0]] : [];\n}".to_string()
}

#[tokio::test]
async fn static_parser_must_write_and_report_before_returning() {
    let tmp = TempDir::new().unwrap();
    let delegate = json!({"tool": "call_static_parser_agent", "args": {"html": PAGE}}).to_string();
    let coordinator = MockService::new(
        "coordinator",
        &[
            delegate.as_str(),
            r#"{"final":{"manifestUrl":"https://cdn.x/master.m3u8","algo_pick":"static"}}"#,
        ],
    );
    let good_write = json!({
        "tool": "code_maintainer_agent_write",
        "args": {"title": "regex", "code": static_code()}
    })
    .to_string();
    let static_parser = MockService::new(
        "static_parser",
        &[
            r#"{"result":{"candidates":["https://cdn.x/master.m3u8"]}}"#,
            r#"{"tool":"code_maintainer_agent_write","args":{"code":"x"}}"#,
            good_write.as_str(),
            r#"{"tool":"record_message","args":{"text":"one hls candidate"}}"#,
            r#"{"result":{"candidates":["https://cdn.x/master.m3u8"]}}"#,
        ],
    );
    let ws = workspace(
        &tmp,
        &services(
            Arc::clone(&coordinator),
            Arc::clone(&static_parser),
            MockService::new("network_capture", &[]),
        ),
    );
    let input = TaskInput {
        algo_name: Some("site_a".into()),
        ..TaskInput::for_url("https://x.test/watch")
    };

    let outcome = run_session(&ws, "run_static", input, &no_progress).await;

    assert!(matches!(outcome, RunOutcome::Done { steps: 2, .. }), "{outcome:?}");
    assert_eq!(static_parser.calls(), 5);

    let opening = static_parser.contents(0);
    assert!(opening[0].contains("cdn.x/master.m3u8"), "html snippet in the prompt");
    assert!(opening[1].starts_with("NEXT_ACTION_REQUEST"));
    assert!(static_parser.saw(1, "MANDATORY_CONTINUE"));
    assert!(static_parser.saw(2, "STRICT_RETRY: The code was empty or too short."));
    assert!(static_parser.saw(3, "MANDATORY_REPORT"));

    assert!(coordinator.saw(1, "TOOL_OUTPUT(call_static_parser_agent): "));
    assert!(coordinator.saw(1, "HINT: Found 1 manifest candidates"));

    let entries = ws.audit.working_entries();
    assert!(
        entries
            .iter()
            .any(|e| e.agent == agents::STATIC_PARSER && e.kind == "result")
    );
    assert!(entries.iter().any(|e| e.kind == "write_code_static"));
    assert_eq!(ws.artifacts.names(), vec!["site_a".to_string()]);
    assert!(tmp.path().join("logs/debug/run_static/subagent_static/input_1.md").exists());
    assert!(tmp.path().join("logs/debug/run_static/subagent_static/output_5.md").exists());
}

#[tokio::test]
async fn exhausted_sub_session_hands_back_an_empty_result() {
    let tmp = TempDir::new().unwrap();
    let coordinator = MockService::new(
        "coordinator",
        &[
            r#"{"tool":"call_network_capture_agent","args":{"url":"https://x.test/watch"}}"#,
            r#"{"final":{"manifestUrl":null,"notes":"nothing captured"}}"#,
        ],
    );
    let network = MockService::with_fallback(
        "network_capture",
        &[],
        r#"{"tool":"record_message","args":{"text":"still looking"}}"#,
    );
    let ws = workspace(
        &tmp,
        &services(
            Arc::clone(&coordinator),
            MockService::new("static_parser", &[]),
            Arc::clone(&network),
        ),
    );

    let outcome = run_session(&ws, "run_exhaust", TaskInput::default(), &no_progress).await;

    assert!(matches!(outcome, RunOutcome::Done { .. }), "{outcome:?}");
    assert_eq!(network.calls(), 8);
    let feedback = coordinator.contents(1);
    let output = feedback
        .iter()
        .find(|c| c.starts_with("TOOL_OUTPUT(call_network_capture_agent): "))
        .unwrap();
    assert!(output.contains(r#""manifestUrl":null"#));
}

#[tokio::test]
async fn unknown_capability_ends_only_the_sub_session() {
    let tmp = TempDir::new().unwrap();
    let coordinator = MockService::new(
        "coordinator",
        &[
            r#"{"tool":"call_static_parser_agent","args":{}}"#,
            r#"{"final":{"manifestUrl":null}}"#,
        ],
    );
    let static_parser = MockService::new("static_parser", &[r#"{"tool":"teleport"}"#]);
    let ws = workspace(
        &tmp,
        &services(
            Arc::clone(&coordinator),
            Arc::clone(&static_parser),
            MockService::new("network_capture", &[]),
        ),
    );

    let outcome = run_session(&ws, "run_sub_unknown", TaskInput::default(), &no_progress).await;

    assert!(matches!(outcome, RunOutcome::Done { .. }), "{outcome:?}");
    assert_eq!(static_parser.calls(), 1);
    let feedback = coordinator.contents(1);
    let output = feedback
        .iter()
        .find(|c| c.starts_with("TOOL_OUTPUT(call_static_parser_agent): "))
        .unwrap();
    assert!(output.contains(r#""ok":false"#));
    assert!(output.contains("unknown capability: teleport"));
}

#[tokio::test]
async fn sub_session_retries_unparseable_replies() {
    let tmp = TempDir::new().unwrap();
    let coordinator = MockService::new(
        "coordinator",
        &[
            r#"{"tool":"call_static_parser_agent","args":{}}"#,
            r#"{"final":{"manifestUrl":null}}"#,
        ],
    );
    let static_parser = MockService::with_fallback(
        "static_parser",
        &["let me think about this page"],
        r#"{"tool":"read_debug_recent","args":{"limit":1}}"#,
    );
    let ws = workspace(
        &tmp,
        &services(
            Arc::clone(&coordinator),
            Arc::clone(&static_parser),
            MockService::new("network_capture", &[]),
        ),
    );

    let outcome = run_session(&ws, "run_retry", TaskInput::default(), &no_progress).await;

    assert!(matches!(outcome, RunOutcome::Done { .. }));
    assert!(static_parser.saw(1, "STRICT_RETRY: The previous output could not be parsed."));
    assert_eq!(static_parser.calls(), 8);
}
