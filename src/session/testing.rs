use crate::llm::{ChatMessage, ChatResponse, ReasoningService};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Replies from a fixed script, then `fallback` forever. Keeps every
/// conversation it was shown.
pub(crate) struct ScriptedService {
    replies: Mutex<VecDeque<anyhow::Result<String>>>,
    fallback: String,
    pub(crate) seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedService {
    pub(crate) fn new(replies: Vec<anyhow::Result<String>>) -> Self {
        Self::with_fallback(replies, r#"{"tool":"noop"}"#)
    }

    pub(crate) fn with_fallback(replies: Vec<anyhow::Result<String>>, fallback: &str) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: fallback.to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn ok(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok((*r).to_string())).collect())
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl ReasoningService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    fn chat<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ChatResponse>> + Send + 'a>> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()));
        Box::pin(async move { reply.map(ChatResponse::text_only) })
    }
}
