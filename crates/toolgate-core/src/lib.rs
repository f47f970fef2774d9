//! Core domain types and the tool handler trait for toolgate-rs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub mod params;

pub use params::{ParamKind, ParamSchema, ParamSpec, Params};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a tool failure.
///
/// Every failure a caller can observe is exactly one of these kinds;
/// `InvalidParameter` and `Cancelled` never reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Caller input failed validation before any outbound call.
    InvalidParameter,
    /// Upstream answered with a non-retryable HTTP status.
    ApiError,
    /// Every retry attempt failed with a transport error or 5xx.
    RetriesExhausted,
    /// Upstream answered 2xx but the body was not parseable.
    ResponseParseError,
    /// The body parsed but expected fields were absent.
    DataShapeError,
    /// The caller-side deadline expired.
    Cancelled,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParameter => "invalid_parameter",
            Self::ApiError => "api_error",
            Self::RetriesExhausted => "retries_exhausted",
            Self::ResponseParseError => "response_parse_error",
            Self::DataShapeError => "data_shape_error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool failure returned as a value, never raised.
///
/// `details` carries enough context to reproduce the failing call:
/// offending parameters, upstream status codes, attempt counts.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl ToolFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Map::new(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn invalid_parameter(parameter: &str, message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidParameter, message).with_detail("parameter", parameter)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, message)
    }
}

/// Payload of a successful tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolReply {
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ToolReply {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            summary: None,
        }
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// Caller-facing result of one tool invocation: exactly one of success or
/// failure. Callers never inspect exception state separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(ToolReply),
    Failure(ToolFailure),
}

impl ToolOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn failure(&self) -> Option<&ToolFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}

impl From<Result<ToolReply, ToolFailure>> for ToolOutcome {
    fn from(result: Result<ToolReply, ToolFailure>) -> Self {
        match result {
            Ok(reply) => Self::Success(reply),
            Err(failure) => Self::Failure(failure),
        }
    }
}

/// Descriptor advertised to callers for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A single named remote-invokable operation.
///
/// Handlers receive parameters already validated against [`ToolHandler::schema`]
/// and return errors as values; the dispatch layer folds the result into a
/// [`ToolOutcome`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn schema(&self) -> ParamSchema;

    async fn call(&self, params: Params) -> Result<ToolReply, ToolFailure>;

    fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.schema().to_json_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = ToolOutcome::Success(ToolReply::new(json!({"answer": 42})).with_summary("ok"));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["data"]["answer"], 42);
        assert_eq!(value["summary"], "ok");
    }

    #[test]
    fn failure_serializes_kind_and_details() {
        let failure = ToolFailure::new(FailureKind::ApiError, "upstream said no")
            .with_detail("status_code", 404);
        let outcome = ToolOutcome::Failure(failure);
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["kind"], "api_error");
        assert_eq!(value["details"]["status_code"], 404);
    }

    #[test]
    fn failure_display_names_kind() {
        let failure = ToolFailure::invalid_parameter("shift", "shift must be one of day, night, all");
        assert_eq!(
            failure.to_string(),
            "invalid_parameter: shift must be one of day, night, all"
        );
    }

    #[test]
    fn outcome_from_result() {
        let ok: ToolOutcome = Ok(ToolReply::new(json!(null))).into();
        assert!(ok.is_success());

        let err: ToolOutcome = Err(ToolFailure::cancelled("deadline expired")).into();
        assert_eq!(err.failure().unwrap().kind, FailureKind::Cancelled);
    }
}
