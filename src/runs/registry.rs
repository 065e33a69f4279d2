use crate::error::RunError;
use crate::session::RunOutcome;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Observable state of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub id: String,
    pub status: RunStatus,
    pub step_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: String,
    pub updated_at: String,
}

impl RunState {
    fn pending(id: &str) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: id.to_string(),
            status: RunStatus::Pending,
            step_count: 0,
            result: None,
            error: None,
            started_at: now.clone(),
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().to_rfc3339();
    }
}

/// Process-wide table of runs. Terminal states are frozen.
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, RunState>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending run. Ids are never reused, even after a run ended.
    pub fn register(&self, id: &str) -> Result<RunState, RunError> {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        if runs.contains_key(id) {
            return Err(RunError::Duplicate(id.to_string()));
        }
        let state = RunState::pending(id);
        runs.insert(id.to_string(), state.clone());
        Ok(state)
    }

    /// Mark the run as iterating at `step`. Ignored once terminal.
    pub fn set_step(&self, id: &str, step: u32) -> Result<(), RunError> {
        self.update(id, |state| {
            state.status = RunStatus::Running;
            state.step_count = step;
        })
    }

    /// Apply the terminal outcome. The first outcome wins.
    pub fn finish(&self, id: &str, outcome: RunOutcome) -> Result<(), RunError> {
        self.update(id, move |state| match outcome {
            RunOutcome::Done { result, steps } => {
                state.status = RunStatus::Done;
                state.step_count = steps;
                state.result = Some(result);
                state.error = None;
            }
            RunOutcome::Failed { error, steps } => {
                state.status = RunStatus::Error;
                state.step_count = steps;
                state.error = Some(error);
            }
        })
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<(), RunError>
    where
        F: FnOnce(&mut RunState),
    {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = runs.get_mut(id) else {
            return Err(RunError::NotFound(id.to_string()));
        };
        if state.status.is_terminal() {
            return Ok(());
        }
        apply(state);
        state.touch();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<RunState> {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        runs.get(id).cloned()
    }

    /// Newest first.
    pub fn list(&self) -> Vec<RunState> {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut states = runs.values().cloned().collect::<Vec<_>>();
        states.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        states
    }
}
