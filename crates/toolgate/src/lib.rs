//! High-level toolgate SDK: a registry of gateway tools and the dispatch
//! surface a transport layer calls into.
//!
//! Dispatch validates arguments against the tool's schema before the handler
//! runs, folds handler results into a single [`ToolOutcome`], and can bound a
//! whole invocation with a deadline that aborts in-flight calls and pending
//! retry waits.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use toolgate_core::{ToolFailure, ToolHandler, ToolInfo, ToolOutcome};
use toolgate_llm::ChatClient;
use toolgate_plant::PlantClient;
use toolgate_weather::WeatherClient;
use tracing::debug;

pub use toolgate_client as client;
pub use toolgate_core as core;
pub use toolgate_llm as llm;
pub use toolgate_plant as plant;
pub use toolgate_weather as weather;

/// The full gateway tool set over one shared HTTP connection pool, with the
/// plant backend and LLM endpoint wired from the environment.
pub fn standard_set(http: reqwest::Client) -> Result<ToolSet, ToolFailure> {
    let weather_client = Arc::new(WeatherClient::new(http.clone())?);
    let plant_client = Arc::new(PlantClient::from_env(http.clone())?);
    let chat_client = Arc::new(ChatClient::from_env(http)?);
    Ok(ToolSet::new()
        .with(toolgate_weather::tools(weather_client))
        .with(toolgate_plant::tools(plant_client, chat_client)))
}

#[derive(Clone, Default)]
pub struct ToolSet {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A handler with the same name is replaced;
    /// returns whether a replacement happened.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> bool {
        self.tools
            .insert(handler.name().to_string(), handler)
            .is_some()
    }

    #[must_use]
    pub fn with(mut self, handlers: Vec<Arc<dyn ToolHandler>>) -> Self {
        for handler in handlers {
            self.register(handler);
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.tools.get(name)
    }

    /// Descriptors of every registered tool, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self.tools.values().map(|h| h.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Invoke a tool by name with a caller-supplied argument object.
    ///
    /// Unknown names and invalid arguments fail before any outbound call.
    /// Handler failures carry the invocation's parameters in their details,
    /// with credential-bearing fields redacted.
    pub async fn invoke(&self, name: &str, args: &Value) -> ToolOutcome {
        let Some(handler) = self.tools.get(name) else {
            return ToolOutcome::Failure(
                ToolFailure::invalid_parameter("tool", format!("unknown tool '{name}'"))
                    .with_detail("tool", name),
            );
        };
        let params = match handler.schema().validate(args) {
            Ok(params) => params,
            Err(failure) => return ToolOutcome::Failure(failure),
        };
        debug!(tool = name, "invoking tool");
        match handler.call(params.clone()).await {
            Ok(reply) => ToolOutcome::Success(reply),
            Err(failure) => ToolOutcome::Failure(
                failure.with_detail("parameters", redact(params.to_value())),
            ),
        }
    }

    /// Invoke with an overall deadline. On expiry the in-flight call is
    /// dropped — aborting outbound requests and pending retry waits — and the
    /// outcome is a `Cancelled` failure; no partial results.
    pub async fn invoke_with_deadline(
        &self,
        name: &str,
        args: &Value,
        deadline: Duration,
    ) -> ToolOutcome {
        match tokio::time::timeout(deadline, self.invoke(name, args)).await {
            Ok(outcome) => outcome,
            Err(_) => ToolOutcome::Failure(
                ToolFailure::cancelled(format!(
                    "tool '{name}' aborted after {}ms",
                    deadline.as_millis()
                ))
                .with_detail("tool", name),
            ),
        }
    }
}

/// Fields never echoed back in failure details.
const REDACTED_FIELDS: &[&str] = &["password", "token"];

fn redact(mut params: Value) -> Value {
    if let Value::Object(map) = &mut params {
        for field in REDACTED_FIELDS {
            if map.contains_key(*field) {
                map.insert((*field).to_string(), Value::String("[redacted]".to_string()));
            }
        }
    }
    params
}
