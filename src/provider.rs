use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::ProviderSettings;

/// Failure classes of the completion endpoint. Transport failures mean the
/// call never produced anything; the other two mean it produced garbage.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response had no recognizable text payload")]
    Malformed,
    #[error("completion response was empty")]
    Empty,
}

impl ProviderError {
    /// True for failures where no text could have been produced at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Request(_) | ProviderError::Status { .. })
    }
}

#[derive(Debug, Clone)]
pub struct GenOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenOptions {
    fn default() -> Self {
        GenOptions {
            max_tokens: 250,
            temperature: 0.8,
        }
    }
}

/// The opaque prompt-to-text capability everything generates through.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenOptions,
    ) -> Result<String, ProviderError>;
}

pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl CompletionClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build completion HTTP client")?;

        Ok(CompletionClient {
            http,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for CompletionClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenOptions,
    ) -> Result<String, ProviderError> {
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "max_tokens": options.max_tokens,
            "temperature": options.temperature
        });

        let mut request = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request_body);

        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response_json: Value = response.json().await?;

        let text = extract_text(&response_json).ok_or(ProviderError::Malformed)?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::Empty);
        }

        Ok(text)
    }
}

/// Normalize the completion payload to plain text. Endpoints in the wild
/// answer in several shapes; all the probing lives here and nowhere else.
pub fn extract_text(result: &Value) -> Option<String> {
    // `response` as an array of items or a bare string.
    if let Some(items) = result.get("response").and_then(Value::as_array) {
        if let Some(text) = items.first().and_then(value_to_text) {
            return Some(text);
        }
    }
    if let Some(text) = result.get("response").and_then(Value::as_str) {
        return Some(text.to_string());
    }

    // OpenAI-style `choices`.
    if let Some(choice) = result
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    {
        if let Some(text) = choice.get("message").and_then(value_to_text) {
            return Some(text);
        }
        if let Some(text) = choice.get("text").and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }

    // Nested `output.choices`.
    if let Some(text) = result
        .get("output")
        .and_then(|o| o.get("choices"))
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(value_to_text)
    {
        return Some(text);
    }

    None
}

/// A text candidate may itself be a string, an array, or an object with
/// one of the usual text fields.
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(value_to_text),
        Value::Object(map) => map
            .get("content")
            .or_else(|| map.get("message"))
            .or_else(|| map.get("text"))
            .and_then(value_to_text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_response_array_of_objects() {
        let payload = json!({ "response": [{ "message": "hold steady" }] });
        assert_eq!(extract_text(&payload).as_deref(), Some("hold steady"));
    }

    #[test]
    fn extracts_response_array_of_strings() {
        let payload = json!({ "response": ["buy the dip"] });
        assert_eq!(extract_text(&payload).as_deref(), Some("buy the dip"));
    }

    #[test]
    fn extracts_openai_choices() {
        let payload = json!({
            "choices": [{ "message": { "role": "assistant", "content": "sell half" } }]
        });
        assert_eq!(extract_text(&payload).as_deref(), Some("sell half"));
    }

    #[test]
    fn extracts_choice_text_field() {
        let payload = json!({ "choices": [{ "text": "watch volume" }] });
        assert_eq!(extract_text(&payload).as_deref(), Some("watch volume"));
    }

    #[test]
    fn extracts_nested_output_choices() {
        let payload = json!({
            "output": { "choices": [{ "message": { "content": "no trade" } }] }
        });
        assert_eq!(extract_text(&payload).as_deref(), Some("no trade"));
    }

    #[test]
    fn extracts_direct_response_string() {
        let payload = json!({ "response": "flat market" });
        assert_eq!(extract_text(&payload).as_deref(), Some("flat market"));
    }

    #[test]
    fn unknown_shape_is_malformed() {
        let payload = json!({ "result": "nothing recognizable" });
        assert_eq!(extract_text(&payload), None);
    }

    #[test]
    fn transport_classification() {
        let status = ProviderError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(status.is_transport());
        assert!(!ProviderError::Malformed.is_transport());
        assert!(!ProviderError::Empty.is_transport());
    }
}
