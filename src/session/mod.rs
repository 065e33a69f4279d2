pub mod bounded_loop;
pub mod budget;
pub mod catalog;
pub mod prompts;
pub mod protocol;
pub mod run;
pub mod seed;
pub mod subagent;
#[cfg(test)]
pub(crate) mod testing;
pub mod trace;

pub use bounded_loop::{BoundedLoop, SessionOutcome, SessionPolicy, StopReason, Verdict};
pub use budget::{ActionTracker, SessionBudget};
pub use run::{RunOutcome, Workspace, run_session};
pub use subagent::SubAgent;
pub use trace::{DebugRecent, TraceScope, TraceWriter};
