pub mod compaction;
pub mod estimate;
pub mod prune;

pub use compaction::{CompactionReport, CompactionSettings, CompactionStrategy, Compactor};
pub use estimate::{estimate_entries_tokens, estimate_tokens};
pub use prune::{PrunePlan, PrunePolicy, plan_prune, target_tokens};
