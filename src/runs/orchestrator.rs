use super::registry::{RunRegistry, RunState};
use crate::capabilities::TaskInput;
use crate::session::{RunOutcome, Workspace, run_session};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

/// Starts runs as background tasks and answers status queries.
///
/// Holds the only handles to the workspace and the run table; nothing else
/// mutates a run once it has been started.
pub struct Orchestrator {
    workspace: Arc<Workspace>,
    registry: Arc<RunRegistry>,
}

impl Orchestrator {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self {
            workspace,
            registry: Arc::new(RunRegistry::new()),
        }
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    /// Register a run and spawn its session. Returns the run id at once.
    pub fn start(&self, input: TaskInput) -> anyhow::Result<String> {
        let run_id = new_run_id();
        self.registry.register(&run_id)?;

        let workspace = Arc::clone(&self.workspace);
        let registry = Arc::clone(&self.registry);
        let id = run_id.clone();
        tokio::spawn(async move {
            let session = {
                let workspace = Arc::clone(&workspace);
                let registry = Arc::clone(&registry);
                let id = id.clone();
                tokio::spawn(async move { drive(&workspace, &registry, &id, input).await })
            };
            // A panicking session must still leave a terminal state behind.
            let outcome = match session.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(run_id = %id, error = %err, "run task aborted");
                    RunOutcome::Failed {
                        error: format!("run task aborted: {err}"),
                        steps: registry.get(&id).map_or(0, |state| state.step_count),
                    }
                }
            };
            finish(&registry, &id, outcome);
        });
        Ok(run_id)
    }

    /// Run inline and return the terminal state.
    pub async fn run_to_completion(&self, input: TaskInput) -> anyhow::Result<RunState> {
        let run_id = new_run_id();
        self.registry.register(&run_id)?;
        let outcome = drive(&self.workspace, &self.registry, &run_id, input).await;
        finish(&self.registry, &run_id, outcome);
        self.registry
            .get(&run_id)
            .ok_or_else(|| anyhow::anyhow!("run vanished from registry: {run_id}"))
    }

    pub fn status(&self, run_id: &str) -> Option<RunState> {
        self.registry.get(run_id)
    }

    pub fn list(&self) -> Vec<RunState> {
        self.registry.list()
    }

    /// Poll until the run is terminal. `None` when the id is unknown.
    pub async fn wait(&self, run_id: &str, interval: Duration) -> Option<RunState> {
        loop {
            let state = self.registry.get(run_id)?;
            if state.status.is_terminal() {
                return Some(state);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

fn new_run_id() -> String {
    format!("run_{}", Uuid::new_v4().simple())
}

async fn drive(
    workspace: &Workspace,
    registry: &RunRegistry,
    run_id: &str,
    input: TaskInput,
) -> RunOutcome {
    let progress = |step: u32| {
        if let Err(err) = registry.set_step(run_id, step) {
            warn!(run_id, error = %err, "could not record step");
        }
    };
    run_session(workspace, run_id, input, &progress).await
}

fn finish(registry: &RunRegistry, run_id: &str, outcome: RunOutcome) {
    if let Err(err) = registry.finish(run_id, outcome) {
        warn!(run_id, error = %err, "could not record run outcome");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::ServiceSet;
    use crate::runs::RunStatus;
    use crate::session::testing::ScriptedService;
    use tempfile::TempDir;

    fn orchestrator(dir: &TempDir, replies: &[&str]) -> Orchestrator {
        let mut config = Config::default();
        config.workspace_dir = dir.path().to_path_buf();
        let services = ServiceSet::uniform(Arc::new(ScriptedService::ok(replies)));
        Orchestrator::new(Arc::new(Workspace::with_services(config, &services).unwrap()))
    }

    #[tokio::test]
    async fn inline_run_reaches_done() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir, &[r#"{"final":{"manifestUrl":"https://cdn.x/a.m3u8"}}"#]);
        let state = orchestrator.run_to_completion(TaskInput::default()).await.unwrap();
        assert_eq!(state.status, RunStatus::Done);
        assert_eq!(state.step_count, 1);
        assert_eq!(state.result.unwrap()["manifestUrl"], "https://cdn.x/a.m3u8");
        assert_eq!(orchestrator.list().len(), 1);
    }

    #[tokio::test]
    async fn started_run_is_observable_until_terminal() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir, &["no directive here"]);
        let run_id = orchestrator.start(TaskInput::default()).unwrap();
        assert!(run_id.starts_with("run_"));
        assert!(orchestrator.status(&run_id).is_some());

        let state = orchestrator
            .wait(&run_id, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(state.status, RunStatus::Error);
        assert!(!state.error.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_run_has_no_status() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir, &[]);
        assert!(orchestrator.status("run_missing").is_none());
        assert!(orchestrator.wait("run_missing", Duration::from_millis(1)).await.is_none());
    }
}
