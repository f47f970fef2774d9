//! Outbound HTTP execution with bounded retries.
//!
//! One [`OutboundCall`] describes one upstream request; [`ApiClient`] executes
//! it under a [`RetryPolicy`]: transport failures and 5xx statuses retry with
//! linear backoff, 4xx statuses short-circuit, 2xx bodies parse as JSON (or
//! pass through as raw text for opaque-token endpoints).

use reqwest::{Client as HttpClient, Method, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use toolgate_core::{FailureKind, ToolFailure};
use tracing::{debug, warn};
use url::Url;

/// Upper bound on the response-body excerpt carried in failure details.
const ERROR_BODY_LIMIT: usize = 200;

/// One outbound HTTP request, fixed before execution.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl OutboundCall {
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            bearer: None,
            body: None,
            timeout: Duration::from_secs(15),
        }
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    #[must_use]
    pub fn json_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Retry schedule for transient upstream failures.
///
/// Backoff is linear: the wait after attempt `n` is `base_delay * n`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Wait before the attempt following attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Whether an HTTP status may be retried. Server-side errors are transient;
/// everything else client-visible is terminal.
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
}

/// Executes [`OutboundCall`]s on a shared connection pool under a retry policy.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpClient,
    policy: RetryPolicy,
}

impl ApiClient {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self::with_policy(http, RetryPolicy::default())
    }

    #[must_use]
    pub fn with_policy(http: HttpClient, policy: RetryPolicy) -> Self {
        Self { http, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute the call and parse the 2xx body as JSON.
    pub async fn send_json(&self, call: &OutboundCall) -> Result<Value, ToolFailure> {
        let response = self.send_raw(call).await?;
        response.json::<Value>().await.map_err(|e| {
            ToolFailure::new(
                FailureKind::ResponseParseError,
                format!("response body is not valid JSON: {e}"),
            )
            .with_detail("url", call.url.as_str())
        })
    }

    /// Execute the call and return the 2xx body verbatim. Used for endpoints
    /// returning opaque token strings.
    pub async fn send_text(&self, call: &OutboundCall) -> Result<String, ToolFailure> {
        let response = self.send_raw(call).await?;
        response.text().await.map_err(|e| {
            ToolFailure::new(
                FailureKind::ResponseParseError,
                format!("failed to read response body: {e}"),
            )
            .with_detail("url", call.url.as_str())
        })
    }

    async fn send_raw(&self, call: &OutboundCall) -> Result<Response, ToolFailure> {
        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            debug!(url = %call.url, attempt, "issuing outbound call");
            match self.attempt(call).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if !is_retryable_status(status) {
                        let body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "failed to read error body".to_string());
                        return Err(api_error(call, status, &body));
                    }
                    last_error = format!("upstream returned {status}");
                    warn!(url = %call.url, attempt, %status, "retryable upstream status");
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(url = %call.url, attempt, error = %last_error, "transport failure");
                }
            }
            if attempt < self.policy.max_attempts {
                sleep(self.policy.delay_after(attempt)).await;
            }
        }
        Err(ToolFailure::new(
            FailureKind::RetriesExhausted,
            format!(
                "request failed after {} attempts: {last_error}",
                self.policy.max_attempts
            ),
        )
        .with_detail("url", call.url.as_str())
        .with_detail("attempts", self.policy.max_attempts))
    }

    async fn attempt(&self, call: &OutboundCall) -> Result<Response, reqwest::Error> {
        let mut request = self
            .http
            .request(call.method.clone(), call.url.clone())
            .timeout(call.timeout);
        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        if let Some(token) = &call.bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }
        request.send().await
    }
}

fn api_error(call: &OutboundCall, status: StatusCode, body: &str) -> ToolFailure {
    ToolFailure::new(
        FailureKind::ApiError,
        format!("upstream returned {status}"),
    )
    .with_detail("url", call.url.as_str())
    .with_detail("status_code", status.as_u16())
    .with_detail("body", truncate(body, ERROR_BODY_LIMIT))
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
