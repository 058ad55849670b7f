//! HTTP client for OpenAI-compatible chat completion endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChatMessage, TextGenerator};
use crate::error::CoachError;

/// Connection settings for [`ChatCompletionClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Base URL without the `/v1/...` path.
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    /// Whole-request timeout, connect through body.
    pub timeout: Duration,
}

impl GeneratorConfig {
    pub const DEFAULT_URL: &str = "https://api.deepseek.com";
    pub const DEFAULT_MODEL: &str = "deepseek-chat";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: Self::DEFAULT_URL.to_owned(),
            api_key: api_key.into(),
            model: Self::DEFAULT_MODEL.to_owned(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Full URL of the completions endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.api_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

/// [`TextGenerator`] backed by a `/v1/chat/completions` endpoint.
pub struct ChatCompletionClient {
    http: reqwest::Client,
    config: GeneratorConfig,
}

impl ChatCompletionClient {
    pub fn new(config: GeneratorConfig) -> Result<Self, CoachError> {
        if config.api_key.trim().is_empty() {
            return Err(CoachError::InvalidInput(
                "generator API key must not be empty".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoachError::Generator(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CoachError> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature,
            max_tokens,
        };

        debug!(
            model = %self.config.model,
            messages = messages.len(),
            max_tokens,
            "calling completion endpoint"
        );

        let response = self
            .http
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoachError::Generator(format!(
                        "request timed out after {}s",
                        self.config.timeout.as_secs()
                    ))
                } else {
                    CoachError::Generator(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(300).collect();
            warn!(status = status.as_u16(), "completion endpoint returned an error");
            return Err(CoachError::Generator(format!("HTTP {status}: {detail}")));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CoachError::Generator(format!("unreadable completion payload: {e}")))?;

        if let Some(usage) = &parsed.usage {
            debug!(total_tokens = usage.total_tokens, "completion finished");
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| CoachError::Generator("completion contained no text".into()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_for(url: String) -> GeneratorConfig {
        GeneratorConfig {
            api_url: url,
            ..GeneratorConfig::new("test-key")
        }
    }

    fn completions() -> wiremock::MockBuilder {
        Mock::given(method("POST")).and(path("/v1/chat/completions"))
    }

    #[test]
    fn endpoint_joins_base_url() {
        let mut cfg = GeneratorConfig::new("k");
        assert_eq!(cfg.endpoint(), "https://api.deepseek.com/v1/chat/completions");
        cfg.api_url = "http://localhost:8080/".into();
        assert_eq!(cfg.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn empty_key_is_rejected() {
        let result = ChatCompletionClient::new(GeneratorConfig::new("  "));
        assert!(matches!(result, Err(CoachError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn returns_first_choice_text() {
        let server = MockServer::start().await;
        completions()
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "deepseek-chat",
                "max_tokens": 400,
                "messages": [{"role": "user", "content": "generate"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "[{\"a\":1}]"}}],
                "usage": {"total_tokens": 12}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(config_for(server.uri())).unwrap();
        let text = client
            .complete(&[ChatMessage::user("generate")], 0.8, 400)
            .await
            .unwrap();
        assert_eq!(text, "[{\"a\":1}]");
    }

    #[tokio::test]
    async fn http_error_maps_to_generator_error() {
        let server = MockServer::start().await;
        completions()
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(config_for(server.uri())).unwrap();
        let err = client
            .complete(&[ChatMessage::user("generate")], 0.8, 400)
            .await
            .unwrap_err();
        match err {
            CoachError::Generator(msg) => {
                assert!(msg.contains("500"), "{msg}");
                assert!(msg.contains("boom"), "{msg}");
            }
            other => panic!("expected Generator error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;
        completions()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(config_for(server.uri())).unwrap();
        let err = client
            .complete(&[ChatMessage::user("generate")], 0.8, 400)
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::Generator(_)));
    }
}
