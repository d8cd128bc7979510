//! LLM sampling through the connected MCP client (`sampling/createMessage`).

use crate::error::{Result, ServerError};
use async_trait::async_trait;
use rmcp::model::{CreateMessageRequestParams, CreateMessageResult};
use rmcp::service::{Peer, RoleServer};
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingRequest {
    pub messages: Vec<(SamplingRole, String)>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

impl SamplingRequest {
    /// Single user message.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self::conversation(vec![(SamplingRole::User, prompt.into())])
    }

    /// Multi-turn history, oldest first.
    #[must_use]
    pub fn conversation(messages: Vec<(SamplingRole, String)>) -> Self {
        Self {
            messages,
            system_prompt: None,
            temperature: None,
            max_tokens: 1000,
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Wire form of `sampling/createMessage` params.
    #[must_use]
    pub fn to_params(&self) -> Value {
        let messages: Vec<Value> = self
            .messages
            .iter()
            .map(|(role, text)| json!({ "role": role, "content": { "type": "text", "text": text } }))
            .collect();
        let mut params = json!({ "messages": messages, "maxTokens": self.max_tokens });
        if let Some(system) = &self.system_prompt {
            params["systemPrompt"] = json!(system);
        }
        if let Some(t) = self.temperature {
            params["temperature"] = json!(t);
        }
        params
    }
}

/// Something that can turn a prompt into model text.
#[async_trait]
pub trait Sampler: Send + Sync {
    async fn sample(&self, request: SamplingRequest) -> Result<String>;
}

/// Samples through the MCP client that issued the current request.
#[derive(Clone)]
pub struct PeerSampler {
    peer: Peer<RoleServer>,
}

impl PeerSampler {
    #[must_use]
    pub fn new(peer: Peer<RoleServer>) -> Self {
        Self { peer }
    }
}

#[async_trait]
impl Sampler for PeerSampler {
    async fn sample(&self, request: SamplingRequest) -> Result<String> {
        let params: CreateMessageRequestParams = serde_json::from_value(request.to_params())?;
        tracing::debug!(
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "requesting sampling from client"
        );
        let result = self
            .peer
            .create_message(params)
            .await
            .map_err(|e| ServerError::Sampling(e.to_string()))?;
        response_text(&result)
    }
}

/// Text of a `sampling/createMessage` result. Content may be a single block or a list of blocks.
///
/// # Errors
///
/// Returns a sampling error when the reply carries no text.
pub fn response_text(result: &CreateMessageResult) -> Result<String> {
    let value = serde_json::to_value(result)?;
    let text = match &value["content"] {
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        block => block
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };
    if text.is_empty() {
        return Err(ServerError::Sampling(
            "client returned no text content".to_string(),
        ));
    }
    Ok(text)
}

/// Ask for `output_format` output about `data`. For `json`, a reply that does not parse is
/// returned as `{"raw_response": ...}`.
///
/// # Errors
///
/// Propagates sampling failures.
pub async fn sample_structured_output(
    sampler: &dyn Sampler,
    data: &Value,
    output_format: &str,
) -> Result<Value> {
    let pretty = serde_json::to_string_pretty(data)?;
    let prompt = format!(
        "Analyze the following data and return results in {output_format} format:\n\n\
         Data: {pretty}\n\n\
         Please structure your response as valid {output_format}."
    );
    let text = sampler
        .sample(
            SamplingRequest::new(prompt)
                .with_temperature(0.2)
                .with_max_tokens(2000),
        )
        .await?;

    if output_format != "json" {
        return Ok(json!({ "response": text }));
    }
    Ok(serde_json::from_str(strip_code_fence(&text))
        .unwrap_or_else(|_| json!({ "raw_response": text })))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

/// Retry a sampling request with exponential backoff (`base_delay * 2^attempt`).
///
/// # Errors
///
/// Returns the last failure once `max_retries` attempts are used up.
pub async fn sample_with_retry(
    sampler: &dyn Sampler,
    request: SamplingRequest,
    max_retries: u32,
    base_delay: Duration,
) -> Result<String> {
    let attempts = max_retries.max(1);
    let mut attempt = 0;
    loop {
        match sampler.sample(request.clone()).await {
            Ok(text) => return Ok(text),
            Err(e) if attempt + 1 >= attempts => return Err(e),
            Err(e) => {
                let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt));
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = attempts,
                    error = %e,
                    "sampling failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
