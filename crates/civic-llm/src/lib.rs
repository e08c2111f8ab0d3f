//! JSON-in/JSON-out chat completion adapter used by every LLM-preferring
//! node in the agent pipeline and coordination workflow. Every call site
//! also defines a deterministic fallback, so adapter failures never
//! propagate past the node boundary that invoked them — this crate only
//! needs to report success or a structured error, never retry or stream.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_json_only")]
    pub json_only: bool,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_json_only() -> bool {
    true
}

impl CompletionRequest {
    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        CompletionRequest {
            system: system.into(),
            user: user.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            json_only: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
}

/// `Complete({system,user,...}) → {content}|{error}`. Adapters strip
/// markdown code fences before returning; callers validate JSON.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<CompletionResponse>;
}

/// Talks to any OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatibleAdapter {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl OpenAiCompatibleAdapter {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        OpenAiCompatibleAdapter {
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl LlmAdapter for OpenAiCompatibleAdapter {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        });
        if request.json_only {
            body["response_format"] = json!({"type": "json_object"});
        }

        let mut req = self.client.post(url).json(&body);
        if let Some(api_key) = &self.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = req.send().await?;
        let status = response.status();
        let value: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let detail = extract_error(&value)
                .unwrap_or_else(|| format!("llm request failed with status {status}"));
            anyhow::bail!(detail);
        }
        if let Some(detail) = extract_error(&value) {
            anyhow::bail!(detail);
        }

        let text = extract_text(&value)
            .ok_or_else(|| anyhow::anyhow!("llm response contained no completion content"))?;

        Ok(CompletionResponse {
            content: strip_markdown_fence(&text),
        })
    }
}

fn extract_error(value: &serde_json::Value) -> Option<String> {
    value
        .get("error")
        .and_then(|e| e.get("message").and_then(|m| m.as_str()).or_else(|| e.as_str()))
        .map(str::to_string)
}

fn extract_text(value: &serde_json::Value) -> Option<String> {
    value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
}

/// Strips a leading/trailing ```json or ``` fence, if present, so callers
/// can `serde_json::from_str` directly on the result.
pub fn strip_markdown_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches('\n');
    rest.strip_suffix("```").unwrap_or(rest).trim().to_string()
}

/// Deterministic stand-in used in tests and whenever no LLM is
/// configured. Returns a fixed response regardless of the prompt.
pub struct StaticAdapter {
    pub response: Result<String, String>,
}

impl StaticAdapter {
    pub fn ok(content: impl Into<String>) -> Self {
        StaticAdapter {
            response: Ok(content.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        StaticAdapter {
            response: Err(message.into()),
        }
    }
}

#[async_trait]
impl LlmAdapter for StaticAdapter {
    async fn complete(&self, _request: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        match &self.response {
            Ok(content) => Ok(CompletionResponse {
                content: content.clone(),
            }),
            Err(message) => Err(anyhow::anyhow!(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_markdown_fence(raw), "{\"a\":1}");
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "```\n{\"a\":1}\n```";
        assert_eq!(strip_markdown_fence(raw), "{\"a\":1}");
    }

    #[test]
    fn passes_through_unfenced_text() {
        assert_eq!(strip_markdown_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn static_adapter_returns_configured_content() {
        let adapter = StaticAdapter::ok("{\"intent\":\"routine\"}");
        let response = adapter
            .complete(CompletionRequest::json("sys", "user"))
            .await
            .unwrap();
        assert_eq!(response.content, "{\"intent\":\"routine\"}");
    }

    #[tokio::test]
    async fn static_adapter_propagates_configured_error() {
        let adapter = StaticAdapter::err("rate limited");
        let err = adapter
            .complete(CompletionRequest::json("sys", "user"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }
}
