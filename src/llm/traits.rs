use super::types::{ChatMessage, ChatResponse};
use std::future::Future;
use std::pin::Pin;

/// A remote reasoning service that turns a conversation into one reply.
///
/// Callers keep the last message user-authored; see
/// [`crate::session::protocol::ensure_trailing_user`].
pub trait ReasoningService: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    fn chat<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ChatResponse>> + Send + 'a>>;
}
