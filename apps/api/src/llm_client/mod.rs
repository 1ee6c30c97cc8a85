/// LLM Client — the single point of entry for all Claude API calls in the optimizer.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// The convergence loop only sees the `TextGenerator` trait.
///
/// Model: hardcoded — do not make configurable to prevent drift.
/// There is deliberately no retry here: transport failures surface to the caller.
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub mod sanitize;

pub use sanitize::strip_code_fences;

const MESSAGES_PATH: &str = "/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls.
pub const MODEL: &str = "claude-opus-4-5-20251101";
const MAX_TOKENS: u32 = 8192;
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Speaker of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a multi-turn conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Produces candidate document text from a system instruction and a transcript.
///
/// Implementations return text that has already been through `strip_code_fences`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, turns: &[Turn]) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Turn],
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Wraps the Anthropic Messages API.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: &str) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(HTTP_TIMEOUT).build()?,
            api_key,
            endpoint: format!("{}{MESSAGES_PATH}", base_url.trim_end_matches('/')),
        })
    }

    /// Makes a single call to the Claude API with the full transcript,
    /// returning the raw response object.
    pub async fn call(&self, system: &str, turns: &[Turn]) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: turns,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Try to parse error message
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        let llm_response: LlmResponse = serde_json::from_slice(&body)?;

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            input_tokens = llm_response.usage.input_tokens,
            output_tokens = llm_response.usage.output_tokens,
            stop_reason = llm_response.stop_reason.as_deref().unwrap_or("unknown"),
            turns = turns.len(),
            "Claude responded"
        );

        Ok(llm_response)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, system: &str, turns: &[Turn]) -> Result<String, LlmError> {
        let response = self.call(system, turns).await?;
        let text = response.text().ok_or(LlmError::EmptyContent)?;
        Ok(strip_code_fences(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn turns() -> Vec<Turn> {
        vec![Turn {
            role: Role::User,
            content: "Please optimize this resume".to_string(),
        }]
    }

    #[test]
    fn test_turn_serializes_lowercase_role() {
        let value = serde_json::to_value(&turns()[0]).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "Please optimize this resume");
    }

    #[test]
    fn test_response_text_picks_first_text_block() {
        let response: LlmResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "text": null},
                {"type": "text", "text": "\\documentclass{article}"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 20},
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(response.text(), Some("\\documentclass{article}"));
        assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));
    }

    #[tokio::test]
    async fn test_generate_sends_transcript_and_strips_fences() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "model": MODEL,
                "max_tokens": MAX_TOKENS,
                "system": "be precise",
                "messages": [{"role": "user", "content": "Please optimize this resume"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "content": [{"type": "text", "text": "```latex\n\\begin{document}\n```"}],
                    "usage": {"input_tokens": 12, "output_tokens": 34},
                    "stop_reason": "end_turn"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = LlmClient::new("test-key".to_string(), &server.url()).unwrap();
        let text = client.generate("be precise", &turns()).await.unwrap();

        assert_eq!(text, "\\begin{document}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_message_is_extracted() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(400)
            .with_body(r#"{"error": {"type": "invalid_request_error", "message": "bad transcript"}}"#)
            .create_async()
            .await;

        let client = LlmClient::new("k".to_string(), &server.url()).unwrap();
        let err = client.generate("s", &turns()).await.unwrap_err();

        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad transcript");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body("overloaded")
            .expect(1)
            .create_async()
            .await;

        let client = LlmClient::new("k".to_string(), &server.url()).unwrap();
        let err = client.generate("s", &turns()).await.unwrap_err();

        assert!(matches!(err, LlmError::Api { status: 529, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_response_without_text_is_empty_content() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(r#"{"content": [], "usage": {"input_tokens": 1, "output_tokens": 0}}"#)
            .create_async()
            .await;

        let client = LlmClient::new("k".to_string(), &server.url()).unwrap();
        let err = client.generate("s", &turns()).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
    }
}
