//! Hosted model access.
//!
//! One non-streaming chat-completions request per call. The trait seam lets
//! the turn loop run against a scripted model in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::utils::url::chat_completions_url;

pub const MODEL_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const MODEL_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ModelError {
    /// The hosted model was unreachable or answered with a failure status.
    #[error("model call failed: {0}")]
    Call(String),
    /// The call succeeded but no usable text came back.
    #[error("model returned no content")]
    Empty,
}

#[async_trait]
pub trait ModelApi: Send + Sync {
    /// Send one system+user exchange, return the assistant text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, ModelError>;
}

pub struct HttpModelClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpModelClient {
    pub fn new(
        model: String,
        base_url: String,
        api_key: Option<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(MODEL_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(MODEL_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| format!("Failed to build HTTP client: {err}"))?;
        Ok(HttpModelClient {
            client,
            base_url,
            api_key,
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelApi for HttpModelClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: false,
        };

        tracing::debug!(model = %self.model, "requesting completion");

        let url = chat_completions_url(&self.base_url);
        let mut http_request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request
            .json(&request)
            .send()
            .await
            .map_err(|err| ModelError::Call(err.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(ModelError::Call(format_api_error(&error_text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| ModelError::Call(format!("invalid response body: {err}")))?;

        parsed
            .first_content()
            .filter(|content| !content.trim().is_empty())
            .ok_or(ModelError::Empty)
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Render an API error body readably: JSON gets pretty-printed with its
/// message pulled up front, anything else is fenced as-is.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
                }
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}
