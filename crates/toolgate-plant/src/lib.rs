//! Production-line telemetry gateway tools.
//!
//! Five tools against an IAS-style plant backend: login, produced-part
//! history, shift OEE, faulty-equipment aggregation, and a line-performance
//! analysis that fans out over two management-report endpoints and asks an
//! LLM for an optimization suggestion.
//!
//! Credentials and the backend base URL are injected by the caller or the
//! environment; nothing is hard-coded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join;
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use toolgate_client::{ApiClient, OutboundCall};
use toolgate_core::{
    FailureKind, ParamKind, ParamSchema, Params, ToolFailure, ToolHandler, ToolReply,
};
use toolgate_llm::ChatClient;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

pub mod aggregate;
pub mod report;
pub mod windows;

pub use aggregate::{latest_state_by_station, EquipmentMessage, StationStatus};
pub use windows::{FrameSpan, Shift};

const LOGIN_PATH: &str = "app/authService/LocalAuthentificationServer/Login";
const HISTORY_PATH: &str = "app/optimumService/ProducedPartServer/GetProducedPartHistoryByLine";
const OEE_PATH: &str = "app/oeeService/OeeServer/GetOeeValue";
const MESSAGES_PATH: &str = "app/machinedataService/MessageDataServer/GetCurrentByLineId";
const REPORT_BASE_PATH: &str = "app/optimumService/ManagementReportServer";

/// Records fetched per management-report endpoint.
const REPORT_COUNT: u32 = 5;

const NO_SUGGESTION: &str = "no suggestion available";

/// Management-report endpoint selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportEndpoint {
    Messages,
    ProcessTimes,
}

impl ReportEndpoint {
    const fn leaf(self) -> &'static str {
        match self {
            Self::Messages => "GetManagementReportMessagesByStations",
            Self::ProcessTimes => "GetManagementReportProcessTimesByStations",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlantClient {
    api: ApiClient,
    base_url: Url,
}

impl PlantClient {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            api: ApiClient::new(http),
            base_url,
        }
    }

    pub fn with_api(api: ApiClient, base_url: Url) -> Self {
        Self { api, base_url }
    }

    /// Build from `PLANT_BASE_URL`.
    pub fn from_env(http: reqwest::Client) -> Result<Self, ToolFailure> {
        let raw = env::var("PLANT_BASE_URL").map_err(|_| {
            ToolFailure::new(
                FailureKind::InvalidParameter,
                "missing environment variable PLANT_BASE_URL",
            )
        })?;
        let base_url = Url::parse(&raw).map_err(|e| {
            ToolFailure::new(
                FailureKind::InvalidParameter,
                format!("invalid PLANT_BASE_URL: {e}"),
            )
        })?;
        Ok(Self::new(http, base_url))
    }

    fn endpoint(&self, path: &str) -> Result<Url, ToolFailure> {
        self.base_url.join(path).map_err(|e| {
            ToolFailure::new(
                FailureKind::InvalidParameter,
                format!("failed to construct endpoint url: {e}"),
            )
        })
    }

    /// Authenticate and return the opaque bearer token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ToolFailure> {
        let url = self.endpoint(LOGIN_PATH)?;
        let call = OutboundCall::post(url)
            .json_body(json!({"Name": username, "Password": password}))
            .timeout(Duration::from_secs(10));
        self.api.send_text(&call).await
    }

    pub async fn produced_part_history(
        &self,
        token: &str,
        line_id: Uuid,
        span: FrameSpan,
        start: &str,
        end: &str,
    ) -> Result<Value, ToolFailure> {
        let (start, end) = windows::frame_bounds(span, start, end)?;
        let url = self.endpoint(HISTORY_PATH)?;
        debug!(%line_id, span = span.code(), "fetching produced part history");
        let call = OutboundCall::get(url)
            .query("lineId", line_id.to_string())
            .query("startTime", start)
            .query("endTime", end)
            .query("frameSpan", span.code().to_string())
            .bearer(token)
            .timeout(Duration::from_secs(60));
        self.api.send_json(&call).await
    }

    pub async fn oee_value(
        &self,
        token: &str,
        line_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Value, ToolFailure> {
        let url = self.endpoint(OEE_PATH)?;
        let call = OutboundCall::get(url)
            .query("lineId", line_id.to_string())
            .query("startDate", windows::format_utc_ms(start))
            .query("endDate", windows::format_utc_ms(end))
            .bearer(token)
            .timeout(Duration::from_secs(15));
        self.api.send_json(&call).await
    }

    /// Current equipment messages for a line, parsed into typed records.
    pub async fn current_messages(
        &self,
        token: &str,
        line_id: Uuid,
    ) -> Result<Vec<EquipmentMessage>, ToolFailure> {
        let url = self.endpoint(MESSAGES_PATH)?;
        let call = OutboundCall::get(url)
            .query("lineId", line_id.to_string())
            .bearer(token)
            .timeout(Duration::from_secs(15));
        let payload = self.api.send_json(&call).await?;
        serde_json::from_value(payload).map_err(|e| {
            ToolFailure::new(
                FailureKind::DataShapeError,
                format!("equipment message feed is missing expected fields: {e}"),
            )
        })
    }

    pub async fn management_report(
        &self,
        endpoint: ReportEndpoint,
        token: &str,
        line_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Value, ToolFailure> {
        let url = self.endpoint(&format!("{REPORT_BASE_PATH}/{}", endpoint.leaf()))?;
        let call = OutboundCall::get(url)
            .query("lineId", line_id.to_string())
            .query("start", windows::format_utc_ms(start))
            .query("end", windows::format_utc_ms(end))
            .query("count", REPORT_COUNT.to_string())
            .bearer(token)
            .timeout(Duration::from_secs(15));
        self.api.send_json(&call).await
    }
}

/// `plant_login`: exchange credentials for a bearer token.
///
/// Credentials come from the call or from `PLANT_USERNAME`/`PLANT_PASSWORD`.
pub struct PlantLogin {
    client: Arc<PlantClient>,
}

impl PlantLogin {
    pub fn new(client: Arc<PlantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for PlantLogin {
    fn name(&self) -> &'static str {
        "plant_login"
    }

    fn description(&self) -> &'static str {
        "Authenticate against the plant backend and return a bearer token"
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .optional("username", ParamKind::String, "Account name; falls back to PLANT_USERNAME")
            .optional("password", ParamKind::String, "Account password; falls back to PLANT_PASSWORD")
    }

    async fn call(&self, params: Params) -> Result<ToolReply, ToolFailure> {
        let username = match params.opt_str("username") {
            Some(name) => name.to_string(),
            None => env::var("PLANT_USERNAME").map_err(|_| {
                ToolFailure::invalid_parameter(
                    "username",
                    "no username supplied and PLANT_USERNAME is unset",
                )
            })?,
        };
        let password = match params.opt_str("password") {
            Some(secret) => secret.to_string(),
            None => env::var("PLANT_PASSWORD").map_err(|_| {
                ToolFailure::invalid_parameter(
                    "password",
                    "no password supplied and PLANT_PASSWORD is unset",
                )
            })?,
        };
        let token = self.client.login(&username, &password).await?;
        Ok(ToolReply::new(json!({"token": token})).with_summary("login succeeded"))
    }
}

/// `produced_part_history`: time-bucketed production counts for a line.
pub struct ProducedPartHistory {
    client: Arc<PlantClient>,
}

impl ProducedPartHistory {
    pub fn new(client: Arc<PlantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for ProducedPartHistory {
    fn name(&self) -> &'static str {
        "produced_part_history"
    }

    fn description(&self) -> &'static str {
        "Produced part history for a line over a time range and frame span \
         (1 = 10 minutes, 2 = 1 hour, 3 = 1 day, 4 = 1 month)"
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("token", ParamKind::String, "Bearer token from plant_login")
            .required("line_id", ParamKind::Uuid, "Production line id")
            .required("start_time", ParamKind::String, "Range start, YYYY-MM-DDTHH:MM:SS")
            .required("end_time", ParamKind::String, "Range end, YYYY-MM-DDTHH:MM:SS")
            .required(
                "frame_span",
                ParamKind::IntEnum(windows::FRAME_SPAN_CODES),
                "Time bucket granularity code",
            )
    }

    async fn call(&self, params: Params) -> Result<ToolReply, ToolFailure> {
        let token = params.str("token")?;
        let line_id = params.uuid("line_id")?;
        let span = FrameSpan::from_code(params.int("frame_span")?).ok_or_else(|| {
            ToolFailure::invalid_parameter("frame_span", "frame_span must be 1, 2, 3 or 4")
                .with_detail("allowed", json!(windows::FRAME_SPAN_CODES))
        })?;
        let history = self
            .client
            .produced_part_history(
                token,
                line_id,
                span,
                params.str("start_time")?,
                params.str("end_time")?,
            )
            .await?;
        Ok(ToolReply::new(json!({"data": history})))
    }
}

/// `shift_oee`: OEE value of a line over one shift window.
pub struct ShiftOee {
    client: Arc<PlantClient>,
}

impl ShiftOee {
    pub fn new(client: Arc<PlantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for ShiftOee {
    fn name(&self) -> &'static str {
        "shift_oee"
    }

    fn description(&self) -> &'static str {
        "OEE value for a line over the day, night or whole shift window of a date"
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("token", ParamKind::String, "Bearer token from plant_login")
            .required("line_id", ParamKind::Uuid, "Production line id")
            .required("date", ParamKind::Date, "Calendar date, YYYY-MM-DD")
            .required(
                "shift",
                ParamKind::StrEnum(windows::SHIFT_LABELS),
                "Shift window: day (04:00-12:00), night (12:00-20:00) or all",
            )
    }

    async fn call(&self, params: Params) -> Result<ToolReply, ToolFailure> {
        let token = params.str("token")?;
        let line_id = params.uuid("line_id")?;
        let date = params.date("date")?;
        let shift = Shift::parse(params.str("shift")?).ok_or_else(|| {
            ToolFailure::invalid_parameter("shift", "shift must be day, night or all")
                .with_detail("allowed", json!(windows::SHIFT_LABELS))
        })?;
        let (start, end) = shift.window_utc(date);
        let oee = self.client.oee_value(token, line_id, start, end).await?;
        Ok(ToolReply::new(json!({
            "line_id": line_id.to_string(),
            "shift": shift.label(),
            "start": windows::format_utc_ms(start),
            "end": windows::format_utc_ms(end),
            "oee": oee,
        })))
    }
}

/// `faulty_equipment`: stations currently in a fault state, from the live
/// message feed, one entry per station with its most recent message.
pub struct FaultyEquipment {
    client: Arc<PlantClient>,
}

impl FaultyEquipment {
    pub fn new(client: Arc<PlantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for FaultyEquipment {
    fn name(&self) -> &'static str {
        "faulty_equipment"
    }

    fn description(&self) -> &'static str {
        "Stations currently reporting Error (optionally Warning) messages"
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("token", ParamKind::String, "Bearer token from plant_login")
            .required("line_id", ParamKind::Uuid, "Production line id")
            .optional_with_default(
                "include_warnings",
                ParamKind::Bool,
                "Also report stations with Warning messages",
                json!(false),
            )
    }

    async fn call(&self, params: Params) -> Result<ToolReply, ToolFailure> {
        let token = params.str("token")?;
        let line_id = params.uuid("line_id")?;
        let include_warnings = params.opt_bool("include_warnings").unwrap_or(false);

        let messages = self.client.current_messages(token, line_id).await?;
        let stations = latest_state_by_station(&messages, include_warnings);

        let devices: Vec<Value> = stations
            .iter()
            .map(|(station_id, status)| {
                let level = if status.latest_category == "Error" {
                    "CRITICAL"
                } else {
                    "WARNING"
                };
                json!({
                    "station_id": station_id,
                    "line_name": status.line_name,
                    "group_name": status.group_name,
                    "station_name": status.station_name,
                    "latest_message": status.latest_message,
                    "latest_timestamp": status.latest_timestamp.to_rfc3339(),
                    "status_level": level,
                    "error_count": status.error_count,
                    "message_codes": status.message_codes,
                })
            })
            .collect();

        let summary = format!("{} stations reporting faults", devices.len());
        Ok(ToolReply::new(json!({
            "line_id": line_id.to_string(),
            "total_messages": messages.len(),
            "faulty_devices": devices,
            "snapshot_time": Utc::now().to_rfc3339(),
        }))
        .with_summary(summary))
    }
}

/// `line_performance`: previous-day bottleneck analysis.
///
/// Fans out over the two management-report endpoints concurrently, reshapes
/// both payloads, and asks the LLM for an optimization suggestion. The
/// suggestion is optional: its failure degrades to a fixed summary while the
/// reshaped data still succeeds.
pub struct LinePerformance {
    client: Arc<PlantClient>,
    chat: Arc<ChatClient>,
}

impl LinePerformance {
    pub fn new(client: Arc<PlantClient>, chat: Arc<ChatClient>) -> Self {
        Self { client, chat }
    }
}

#[async_trait]
impl ToolHandler for LinePerformance {
    fn name(&self) -> &'static str {
        "line_performance"
    }

    fn description(&self) -> &'static str {
        "Analyze the previous day's line performance and suggest optimizations"
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("token", ParamKind::String, "Bearer token from plant_login")
            .required("line_id", ParamKind::Uuid, "Production line id")
    }

    async fn call(&self, params: Params) -> Result<ToolReply, ToolFailure> {
        let token = params.str("token")?;
        let line_id = params.uuid("line_id")?;
        let (start, end) = windows::previous_utc_day(Utc::now());

        let (messages_result, process_result) = join(
            self.client
                .management_report(ReportEndpoint::Messages, token, line_id, start, end),
            self.client
                .management_report(ReportEndpoint::ProcessTimes, token, line_id, start, end),
        )
        .await;

        let mut failures = Vec::new();
        if let Err(failure) = &messages_result {
            failures.push(("messages", failure.clone()));
        }
        if let Err(failure) = &process_result {
            failures.push(("process_times", failure.clone()));
        }
        if let Some((_, first)) = failures.first() {
            let named: Vec<Value> = failures
                .iter()
                .map(|(endpoint, failure)| {
                    json!({
                        "endpoint": endpoint,
                        "kind": failure.kind,
                        "message": failure.message,
                    })
                })
                .collect();
            return Err(ToolFailure::new(first.kind, "management report fetch failed")
                .with_detail("failures", Value::Array(named)));
        }

        // both checked above
        let messages_payload = messages_result.unwrap_or_default();
        let process_payload = process_result.unwrap_or_default();

        let fault_events = report::summarize_report_messages(&messages_payload);
        let cycle_times = report::summarize_process_times(&process_payload);

        let prompt = report::build_analysis_prompt(&fault_events, &cycle_times);
        let suggestion = match self.chat.complete(&prompt).await {
            Ok(text) => text,
            Err(failure) => {
                warn!(error = %failure, "suggestion request failed, continuing without it");
                NO_SUGGESTION.to_string()
            }
        };

        Ok(ToolReply::new(json!({
            "line_id": line_id.to_string(),
            "window": {
                "start": windows::format_utc_ms(start),
                "end": windows::format_utc_ms(end),
            },
            "fault_events": fault_events,
            "cycle_times": cycle_times,
        }))
        .with_summary(suggestion))
    }
}

/// All plant tools over one shared client pair.
pub fn tools(client: Arc<PlantClient>, chat: Arc<ChatClient>) -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(PlantLogin::new(client.clone())),
        Arc::new(ProducedPartHistory::new(client.clone())),
        Arc::new(ShiftOee::new(client.clone())),
        Arc::new(FaultyEquipment::new(client.clone())),
        Arc::new(LinePerformance::new(client, chat)),
    ]
}
