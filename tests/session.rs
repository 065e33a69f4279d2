#[path = "support/harness.rs"]
mod harness;

#[path = "session/run_flow.rs"]
mod run_flow;
#[path = "session/subagent_flow.rs"]
mod subagent_flow;
