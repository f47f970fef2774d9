//! Minimal OpenAI-compatible chat-completion client.
//!
//! Used by the line-performance tool to turn reshaped telemetry summaries
//! into a free-text optimization suggestion. One request, no streaming.

use serde_json::{json, Value};
use std::env;
use toolgate_client::{ApiClient, OutboundCall, RetryPolicy};
use toolgate_core::{FailureKind, ToolFailure};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct ChatClient {
    api: ApiClient,
    api_key: String,
    base_url: Url,
    model: String,
    temperature: f32,
}

impl ChatClient {
    /// Build from explicit settings. The completion endpoint is derived by
    /// joining `chat/completions` onto `base_url`.
    pub fn new(
        http: reqwest::Client,
        api_key: impl Into<String>,
        base_url: Url,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api: ApiClient::with_policy(http, RetryPolicy::none()),
            api_key: api_key.into(),
            base_url,
            model: model.into(),
            temperature: 0.3,
        }
    }

    /// Build from `LLM_API_KEY`, `LLM_BASE_URL` and `LLM_MODEL`.
    pub fn from_env(http: reqwest::Client) -> Result<Self, ToolFailure> {
        let api_key = env::var("LLM_API_KEY").map_err(|_| missing_env("LLM_API_KEY"))?;
        let raw_url = env::var("LLM_BASE_URL").map_err(|_| missing_env("LLM_BASE_URL"))?;
        let model = env::var("LLM_MODEL").map_err(|_| missing_env("LLM_MODEL"))?;
        let base_url = Url::parse(&raw_url).map_err(|e| {
            ToolFailure::new(
                FailureKind::InvalidParameter,
                format!("invalid LLM_BASE_URL: {e}"),
            )
        })?;
        Ok(Self::new(http, api_key, base_url, model))
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Send one user prompt and return the completion text.
    pub async fn complete(&self, prompt: &str) -> Result<String, ToolFailure> {
        let url = self.base_url.join("chat/completions").map_err(|e| {
            ToolFailure::new(
                FailureKind::InvalidParameter,
                format!("failed to construct completion url: {e}"),
            )
        })?;
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
        });
        debug!(model = %self.model, "requesting chat completion");
        let payload = self
            .api
            .send_json(&OutboundCall::post(url).bearer(&self.api_key).json_body(body))
            .await?;
        extract_completion_text(&payload)
    }
}

fn extract_completion_text(payload: &Value) -> Result<String, ToolFailure> {
    payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| {
            ToolFailure::new(
                FailureKind::DataShapeError,
                "completion response has no choices[0].message.content",
            )
        })
}

fn missing_env(name: &str) -> ToolFailure {
    ToolFailure::new(
        FailureKind::InvalidParameter,
        format!("missing environment variable {name}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ChatClient {
        ChatClient::new(
            reqwest::Client::new(),
            "test-key",
            Url::parse(&server.uri()).unwrap(),
            "line-analyst-1",
        )
    }

    #[tokio::test]
    async fn completion_contract_extracts_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "line-analyst-1",
                "messages": [{"role": "user"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "Check station S3 first."}
                }]
            })))
            .mount(&server)
            .await;

        let text = client_for(&server).complete("analyze this").await.unwrap();
        assert_eq!(text, "Check station S3 first.");
    }

    #[tokio::test]
    async fn missing_choices_is_a_data_shape_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let failure = client_for(&server).complete("analyze this").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::DataShapeError);
    }

    #[tokio::test]
    async fn upstream_client_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let failure = client_for(&server).complete("analyze this").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ApiError);
        assert_eq!(failure.details["status_code"], 401);
    }
}
