pub mod codec;
pub mod entry;
pub mod store;

pub use entry::{AuditEntry, EntryDraft, Flag, agents};
pub use store::{AuditStore, EntryFilter, FileMeasure};
