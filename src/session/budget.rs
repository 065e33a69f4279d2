use crate::capabilities::ActionKind;
use std::collections::HashSet;

pub const DEFAULT_MAX_STEPS: u32 = 100;
pub const DEFAULT_SUB_MAX_STEPS: u32 = 8;

/// Step limit plus the actions a session must perform before a `Result` may
/// end it. The top-level session has no mandatory actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBudget {
    pub max_steps: u32,
    pub mandatory: Vec<ActionKind>,
}

impl SessionBudget {
    pub fn top_level(raw_max_steps: i64) -> Self {
        Self {
            max_steps: sanitize_steps(raw_max_steps, DEFAULT_MAX_STEPS),
            mandatory: Vec::new(),
        }
    }

    /// Sub-sessions must write an artifact and a report.
    pub fn delegated(raw_max_steps: i64) -> Self {
        Self {
            max_steps: sanitize_steps(raw_max_steps, DEFAULT_SUB_MAX_STEPS),
            mandatory: vec![ActionKind::ArtifactWritten, ActionKind::ReportWritten],
        }
    }
}

/// Zero, negative or out-of-range values fall back to `default`.
pub fn sanitize_steps(raw: i64, default: u32) -> u32 {
    u32::try_from(raw).ok().filter(|v| *v > 0).unwrap_or(default)
}

/// Actions observed during one session.
#[derive(Debug, Default)]
pub struct ActionTracker {
    seen: HashSet<ActionKind>,
}

impl ActionTracker {
    pub fn record(&mut self, action: ActionKind) {
        self.seen.insert(action);
    }

    pub fn satisfies(&self, budget: &SessionBudget) -> bool {
        budget.mandatory.iter().all(|a| self.seen.contains(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_steps_fall_back() {
        assert_eq!(sanitize_steps(0, 100), 100);
        assert_eq!(sanitize_steps(-4, 8), 8);
        assert_eq!(sanitize_steps(i64::MAX, 8), 8);
        assert_eq!(sanitize_steps(3, 100), 3);
    }

    #[test]
    fn tracker_requires_every_mandatory_action() {
        let budget = SessionBudget::delegated(0);
        assert_eq!(budget.max_steps, 8);
        let mut tracker = ActionTracker::default();
        assert!(!tracker.satisfies(&budget));
        tracker.record(ActionKind::ArtifactWritten);
        assert!(!tracker.satisfies(&budget));
        tracker.record(ActionKind::ReportWritten);
        assert!(tracker.satisfies(&budget));
        assert!(tracker.satisfies(&SessionBudget::top_level(5)));
    }
}
