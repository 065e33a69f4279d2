pub mod compatible;
pub mod factory;
pub mod http_client;
pub mod sensitive;
pub mod traits;
pub mod types;

pub use compatible::CompatibleService;
pub use factory::{ServiceRole, ServiceSet, create_service};
pub use sensitive::SensitiveFilter;
pub use traits::ReasoningService;
pub use types::{ChatMessage, ChatResponse, MessageRole};
