//! Run control: the process-wide run table and the orchestrator that
//! starts sessions and reports their state.

pub mod orchestrator;
pub mod registry;

pub use orchestrator::Orchestrator;
pub use registry::{RunRegistry, RunState, RunStatus};
