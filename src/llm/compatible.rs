//! OpenAI-compatible chat completions transport.

use super::http_client::build_service_client;
use super::sensitive::SensitiveFilter;
use super::traits::ReasoningService;
use super::types::{ChatMessage, ChatResponse};
use crate::error::LlmError;
use anyhow::Context;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

const MAX_ERROR_BODY_CHARS: usize = 500;

pub struct CompatibleService {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    json_mode: bool,
    filter: Option<Arc<SensitiveFilter>>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl CompatibleService {
    pub fn new(name: &str, endpoint: &str, api_key: Option<&str>, model: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(ToString::to_string),
            model: model.to_string(),
            temperature: 0.2,
            json_mode: true,
            filter: None,
            client: build_service_client(120),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.client = build_service_client(timeout_secs);
        self
    }

    pub fn with_filter(mut self, filter: Option<Arc<SensitiveFilter>>) -> Self {
        self.filter = filter;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn outbound(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|message| ChatMessage {
                role: message.role,
                content: match &self.filter {
                    Some(filter) => filter.mask(&message.content),
                    None => message.content.clone(),
                },
            })
            .collect()
    }

    async fn chat_inner(&self, messages: &[ChatMessage]) -> anyhow::Result<ChatResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(LlmError::Auth {
                service: self.name.clone(),
            }
            .into());
        };

        let request = ChatRequest {
            model: &self.model,
            messages: self.outbound(messages),
            temperature: self.temperature,
            response_format: self.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!(service = %self.name, messages = messages.len(), "reasoning request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| LlmError::Request {
                service: self.name.clone(),
                message: error.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("{} response body read failed", self.name))?;
        if !status.is_success() {
            return Err(LlmError::Request {
                service: self.name.clone(),
                message: format!("HTTP {status}: {}", truncate_body(&body)),
            }
            .into());
        }

        let mut raw: Value = serde_json::from_str(&body).map_err(|_| LlmError::Request {
            service: self.name.clone(),
            message: format!("invalid JSON response: {}", truncate_body(&body)),
        })?;

        let content = raw
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::EmptyResponse {
                service: self.name.clone(),
            })?;
        let content = match &self.filter {
            Some(filter) => filter.unmask(content),
            None => content.to_string(),
        };
        if let Some(slot) = raw.pointer_mut("/choices/0/message/content") {
            *slot = Value::String(content.clone());
        }

        Ok(ChatResponse { content, raw })
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let cut: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{cut}...")
}

impl ReasoningService for CompatibleService {
    fn name(&self) -> &str {
        &self.name
    }

    fn chat<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ChatResponse>> + Send + 'a>> {
        Box::pin(self.chat_inner(messages))
    }
}
