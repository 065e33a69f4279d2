pub mod parser;
pub mod types;

pub use parser::{ParseStage, parse_directive, parse_directive_traced};
pub use types::{Directive, DirectiveKind};
