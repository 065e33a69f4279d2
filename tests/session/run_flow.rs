use std::sync::{Arc, Mutex};

use conductor::audit::{Flag, agents};
use conductor::capabilities::TaskInput;
use conductor::session::{RunOutcome, run_session};
use serde_json::json;
use tempfile::TempDir;

use super::harness::{MockService, no_progress, single_service_workspace};

const ALGORITHM: &str = "async function resolve(page) {\n  const res = await fetch(page.url);\n  return (await res.text()).match(/https:[^\"]+\\.m3u8/)[0];\n}";

#[tokio::test]
async fn final_directive_on_first_step_finishes_the_run() {
    let tmp = TempDir::new().unwrap();
    let service = MockService::new(
        "coordinator",
        &[r#"{"final":{"manifestUrl":"https://cdn.x/a.m3u8"}}"#],
    );
    let ws = single_service_workspace(&tmp, Arc::clone(&service));

    let outcome = run_session(&ws, "run_final", TaskInput::for_url("https://x.test/watch"), &no_progress).await;

    let RunOutcome::Done { result, steps } = outcome else {
        panic!("expected done, got {outcome:?}");
    };
    assert_eq!(steps, 1);
    assert_eq!(result["manifestUrl"], "https://cdn.x/a.m3u8");
    assert_eq!(service.calls(), 1);

    let seed = service.contents(0);
    assert!(seed[0].starts_with("You are the Coordinator"));
    assert!(seed.iter().any(|c| c.starts_with("Input summary: Example URL: https://x.test/watch")));

    let trace = tmp.path().join("logs/debug/run_final");
    assert!(trace.join("initial_input.md").exists());
    assert!(trace.join("llm_input_step_1.md").exists());
    assert!(trace.join("llm_output_step_1.md").exists());
}

#[tokio::test]
async fn prose_reply_fails_the_run_with_a_diagnosis() {
    let tmp = TempDir::new().unwrap();
    let service = MockService::new("coordinator", &["I think we should fetch the page"]);
    let ws = single_service_workspace(&tmp, service);

    let outcome = run_session(&ws, "run_prose", TaskInput::default(), &no_progress).await;

    let RunOutcome::Failed { error, steps } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(!error.is_empty());
    assert_eq!(steps, 1);

    let entries = ws.audit.working_entries();
    let errors: Vec<_> = entries.iter().filter(|e| e.kind == "error").collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].agent, agents::COORDINATOR);
    assert!(
        entries
            .iter()
            .any(|e| e.kind == "diagnose" && e.has_flag(Flag::Error))
    );
}

#[tokio::test]
async fn service_errors_fail_the_run() {
    let tmp = TempDir::new().unwrap();
    let ws = single_service_workspace(&tmp, MockService::failing("coordinator", "connection reset"));

    let outcome = run_session(&ws, "run_down", TaskInput::default(), &no_progress).await;

    assert!(matches!(outcome, RunOutcome::Failed { steps: 1, .. }));
    assert!(tmp.path().join("logs/debug/run_down/llm_output_step_1.md").exists());
}

#[tokio::test]
async fn step_budget_bounds_every_run() {
    for max_steps in 1..=4_i64 {
        let tmp = TempDir::new().unwrap();
        let service = MockService::with_fallback("coordinator", &[], r#"{"tool":"estimate_tokens"}"#);
        let ws = single_service_workspace(&tmp, Arc::clone(&service));
        let progress_seen = Mutex::new(Vec::new());
        let progress = |step: u32| progress_seen.lock().unwrap().push(step);
        let input = TaskInput {
            max_steps: Some(max_steps),
            ..TaskInput::default()
        };

        let outcome = run_session(&ws, "run_budget", input, &progress).await;

        let expected = u32::try_from(max_steps).unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Failed {
                error: format!("reached max steps ({expected}) without completing"),
                steps: expected,
            }
        );
        assert_eq!(service.calls(), expected as usize);
        assert_eq!(progress_seen.lock().unwrap().len(), expected as usize);
    }
}

#[tokio::test]
async fn invalid_budget_falls_back_to_the_default() {
    let tmp = TempDir::new().unwrap();
    let service = MockService::new(
        "coordinator",
        &[r#"{"tool":"estimate_tokens"}"#, r#"{"final":{"manifestUrl":null}}"#],
    );
    let ws = single_service_workspace(&tmp, Arc::clone(&service));
    let input = TaskInput {
        max_steps: Some(-5),
        ..TaskInput::default()
    };

    let outcome = run_session(&ws, "run_default", input, &no_progress).await;

    assert!(matches!(outcome, RunOutcome::Done { steps: 2, .. }));
}

#[tokio::test]
async fn unknown_capability_is_a_hard_failure() {
    let tmp = TempDir::new().unwrap();
    let service = MockService::new("coordinator", &[r#"{"tool":"teleport","args":{}}"#]);
    let ws = single_service_workspace(&tmp, Arc::clone(&service));

    let outcome = run_session(&ws, "run_unknown", TaskInput::default(), &no_progress).await;

    assert_eq!(
        outcome,
        RunOutcome::Failed {
            error: "unknown capability: teleport".into(),
            steps: 1,
        }
    );
    assert_eq!(service.calls(), 1);
    let errors = ws
        .audit
        .working_entries()
        .into_iter()
        .filter(|e| e.kind == "error" && e.text.contains("teleport"))
        .count();
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn tool_calls_are_audited_and_fed_back() {
    let tmp = TempDir::new().unwrap();
    let service = MockService::new(
        "coordinator",
        &[
            r#"{"tool":"record_message","args":{"text":"page looks like hls"},"comment":"noting it","flags":["DECISION"]}"#,
            r#"{"result":{"candidates":["https://cdn.x/a.m3u8"]}}"#,
            r#"{"final":{"manifestUrl":"https://cdn.x/a.m3u8"}}"#,
        ],
    );
    let ws = single_service_workspace(&tmp, Arc::clone(&service));

    let outcome = run_session(&ws, "run_tools", TaskInput::default(), &no_progress).await;
    assert!(matches!(outcome, RunOutcome::Done { steps: 3, .. }));

    let entries = ws.audit.working_entries();
    let call = entries.iter().find(|e| e.kind == "tool_call").unwrap();
    assert!(call.has_flag(Flag::Decision));
    assert_eq!(call.payload.as_ref().unwrap()["tool"], "record_message");
    assert!(entries.iter().any(|e| e.kind == "result"));

    assert!(service.saw(1, "TOOL_OUTPUT(record_message): "));
    assert!(service.saw(1, "COMMENT: noting it"));
    assert!(service.saw(2, "HINT: Result noted."));
    for index in 0..3 {
        let contents = service.contents(index);
        assert!(!contents.last().unwrap().starts_with("COMMENT: "), "call {index} ends on a user turn");
    }
}

#[tokio::test]
async fn final_persists_the_picked_artifact() {
    let tmp = TempDir::new().unwrap();
    let write = json!({
        "tool": "code_maintainer_agent_write",
        "args": {"target": "dynamic", "title": "capture", "code": ALGORITHM}
    })
    .to_string();
    let service = MockService::new(
        "coordinator",
        &[
            write.as_str(),
            r#"{"final":{"manifestUrl":"https://cdn.x/a.m3u8","algo_pick":"dynamic"}}"#,
        ],
    );
    let ws = single_service_workspace(&tmp, Arc::clone(&service));
    let input = TaskInput {
        algo_name: Some("demo".into()),
        ..TaskInput::for_url("https://x.test/watch")
    };

    let outcome = run_session(&ws, "run_store", input, &no_progress).await;

    assert!(matches!(outcome, RunOutcome::Done { .. }));
    assert_eq!(ws.artifacts.names(), vec!["demo".to_string()]);
    let finalized = ws
        .audit
        .working_entries()
        .into_iter()
        .find(|e| e.kind == "finalize")
        .unwrap();
    assert!(finalized.has_flag(Flag::Critical));
}
