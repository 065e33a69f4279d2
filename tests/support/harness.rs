#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use conductor::Config;
use conductor::llm::{ChatMessage, ChatResponse, ReasoningService, ServiceSet};
use conductor::session::Workspace;
use tempfile::TempDir;

/// Replies from a script, then a fixed fallback. Records every conversation.
pub struct MockService {
    name: String,
    replies: Mutex<VecDeque<anyhow::Result<String>>>,
    fallback: String,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockService {
    pub fn new(name: &str, replies: &[&str]) -> Arc<Self> {
        Self::with_fallback(name, replies, r#"{"tool":"estimate_tokens"}"#)
    }

    pub fn with_fallback(name: &str, replies: &[&str], fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            replies: Mutex::new(replies.iter().map(|r| Ok((*r).to_string())).collect()),
            fallback: fallback.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &str, message: &str) -> Arc<Self> {
        let service = Self::new(name, &[]);
        service
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(anyhow::anyhow!(message.to_string())));
        service
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Message contents of the `index`-th call.
    pub fn contents(&self, index: usize) -> Vec<String> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)[index]
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    pub fn saw(&self, index: usize, prefix: &str) -> bool {
        self.contents(index).iter().any(|c| c.starts_with(prefix))
    }
}

impl ReasoningService for MockService {
    fn name(&self) -> &str {
        &self.name
    }

    fn chat<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ChatResponse>> + Send + 'a>> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()));
        Box::pin(async move { reply.map(ChatResponse::text_only) })
    }
}

pub fn config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.workspace_dir = dir.path().to_path_buf();
    config.audit.log_dir = Some(dir.path().join("logs").display().to_string());
    config
}

pub fn services(
    coordinator: Arc<MockService>,
    static_parser: Arc<MockService>,
    network_capture: Arc<MockService>,
) -> ServiceSet {
    ServiceSet {
        coordinator,
        static_parser,
        network_capture,
        history_compressor: MockService::new("history_compressor", &[]),
    }
}

pub fn workspace(dir: &TempDir, services: &ServiceSet) -> Workspace {
    Workspace::with_services(config(dir), services).unwrap()
}

pub fn single_service_workspace(dir: &TempDir, service: Arc<MockService>) -> Workspace {
    workspace(dir, &ServiceSet::uniform(service))
}

pub fn no_progress(_: u32) {}
