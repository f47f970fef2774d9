//! Open-Meteo gateway tools: current conditions, date-range summaries, and a
//! timezone clock.
//!
//! Weather queries are a dependent chain: the city name resolves to
//! coordinates through the geocoding endpoint, then the forecast endpoint is
//! queried with them. A geocoding failure propagates without issuing the
//! dependent call.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use toolgate_client::{ApiClient, OutboundCall};
use toolgate_core::{
    FailureKind, ParamKind, ParamSchema, Params, ToolFailure, ToolHandler, ToolReply,
};
use tracing::debug;
use url::Url;

pub mod codes;

const GEOCODING_BASE: &str = "https://geocoding-api.open-meteo.com";
const FORECAST_BASE: &str = "https://api.open-meteo.com";
const HOURLY_VARIABLES: &str = "temperature_2m,relative_humidity_2m,dew_point_2m,weather_code";

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Hourly series as returned by the forecast endpoint; every vector is
/// index-aligned with `time`.
#[derive(Debug, Clone, Deserialize)]
pub struct HourlySeries {
    pub time: Vec<String>,
    pub temperature_2m: Vec<f64>,
    pub relative_humidity_2m: Vec<f64>,
    pub dew_point_2m: Vec<f64>,
    pub weather_code: Vec<u16>,
}

/// Time bound of a forecast query.
#[derive(Debug, Clone)]
enum ForecastRange {
    /// The next 24 hourly buckets.
    NextDay,
    /// Inclusive calendar dates, `YYYY-MM-DD`.
    Dates { start: String, end: String },
}

#[derive(Debug, Clone)]
pub struct WeatherClient {
    api: ApiClient,
    geocoding_url: Url,
    forecast_url: Url,
}

impl WeatherClient {
    /// Client against the public Open-Meteo endpoints.
    pub fn new(http: reqwest::Client) -> Result<Self, ToolFailure> {
        let geocoding_url = Url::parse(GEOCODING_BASE).map_err(bad_base_url)?;
        let forecast_url = Url::parse(FORECAST_BASE).map_err(bad_base_url)?;
        Ok(Self {
            api: ApiClient::new(http),
            geocoding_url,
            forecast_url,
        })
    }

    /// Client against explicit base URLs, for tests and proxies.
    pub fn with_base_urls(api: ApiClient, geocoding_url: Url, forecast_url: Url) -> Self {
        Self {
            api,
            geocoding_url,
            forecast_url,
        }
    }

    async fn coordinates(&self, city: &str) -> Result<Coordinates, ToolFailure> {
        let url = self.endpoint(&self.geocoding_url, "/v1/search")?;
        let payload = self
            .api
            .send_json(&OutboundCall::get(url).query("name", city).query("count", "1"))
            .await?;
        let results = payload
            .get("results")
            .and_then(Value::as_array)
            .filter(|results| !results.is_empty())
            .ok_or_else(|| {
                ToolFailure::new(
                    FailureKind::DataShapeError,
                    format!("could not resolve coordinates for '{city}'"),
                )
                .with_detail("city", city)
            })?;
        serde_json::from_value(results[0].clone()).map_err(|e| {
            ToolFailure::new(
                FailureKind::DataShapeError,
                format!("geocoding result is missing coordinates: {e}"),
            )
        })
    }

    async fn hourly(
        &self,
        coordinates: Coordinates,
        range: &ForecastRange,
    ) -> Result<HourlySeries, ToolFailure> {
        let url = self.endpoint(&self.forecast_url, "/v1/forecast")?;
        let mut call = OutboundCall::get(url)
            .query("latitude", coordinates.latitude.to_string())
            .query("longitude", coordinates.longitude.to_string())
            .query("hourly", HOURLY_VARIABLES)
            .query("timezone", "GMT");
        call = match range {
            ForecastRange::NextDay => call.query("forecast_days", "1"),
            ForecastRange::Dates { start, end } => {
                call.query("start_date", start).query("end_date", end)
            }
        };
        debug!(latitude = coordinates.latitude, longitude = coordinates.longitude, "fetching forecast");
        let payload = self.api.send_json(&call).await?;
        let hourly = payload.get("hourly").cloned().ok_or_else(|| {
            ToolFailure::new(FailureKind::DataShapeError, "forecast response has no hourly block")
        })?;
        serde_json::from_value(hourly).map_err(|e| {
            ToolFailure::new(
                FailureKind::DataShapeError,
                format!("hourly block is missing expected series: {e}"),
            )
        })
    }

    fn endpoint(&self, base: &Url, path: &str) -> Result<Url, ToolFailure> {
        base.join(path).map_err(|e| {
            ToolFailure::new(
                FailureKind::InvalidParameter,
                format!("failed to construct endpoint url: {e}"),
            )
        })
    }
}

fn bad_base_url(error: url::ParseError) -> ToolFailure {
    ToolFailure::new(
        FailureKind::InvalidParameter,
        format!("invalid weather base url: {error}"),
    )
}

/// Parse an Open-Meteo hourly timestamp (`YYYY-MM-DDTHH:MM`, GMT).
fn parse_hour(text: &str) -> Result<DateTime<Utc>, ToolFailure> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            ToolFailure::new(
                FailureKind::DataShapeError,
                format!("unparseable hourly timestamp '{text}': {e}"),
            )
        })
}

/// Index of the instant closest to `now`, over an index-aligned time axis.
fn closest_index(times: &[DateTime<Utc>], now: DateTime<Utc>) -> Option<usize> {
    times
        .iter()
        .enumerate()
        .min_by_key(|(_, t)| (**t - now).abs())
        .map(|(index, _)| index)
}

fn series_record(series: &HourlySeries, index: usize) -> Result<Value, ToolFailure> {
    let get = |name: &str, len: usize| {
        if index < len {
            Ok(())
        } else {
            Err(ToolFailure::new(
                FailureKind::DataShapeError,
                format!("hourly series '{name}' is shorter than the time axis"),
            ))
        }
    };
    get("temperature_2m", series.temperature_2m.len())?;
    get("relative_humidity_2m", series.relative_humidity_2m.len())?;
    get("dew_point_2m", series.dew_point_2m.len())?;
    get("weather_code", series.weather_code.len())?;
    Ok(json!({
        "time": series.time[index],
        "temperature_c": series.temperature_2m[index],
        "humidity_percent": series.relative_humidity_2m[index],
        "dew_point_c": series.dew_point_2m[index],
        "weather_description": codes::describe(series.weather_code[index]),
    }))
}

/// `current_weather`: geocode, fetch a one-day hourly forecast, report the
/// hour nearest to now.
pub struct CurrentWeather {
    client: Arc<WeatherClient>,
}

impl CurrentWeather {
    pub fn new(client: Arc<WeatherClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for CurrentWeather {
    fn name(&self) -> &'static str {
        "current_weather"
    }

    fn description(&self) -> &'static str {
        "Get current weather conditions for a city (English name)"
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new().required("city", ParamKind::String, "City name, English")
    }

    async fn call(&self, params: Params) -> Result<ToolReply, ToolFailure> {
        let city = params.str("city")?;
        let coordinates = self.client.coordinates(city).await?;
        let series = self.client.hourly(coordinates, &ForecastRange::NextDay).await?;

        let times = series
            .time
            .iter()
            .map(|t| parse_hour(t))
            .collect::<Result<Vec<_>, _>>()?;
        let index = closest_index(&times, Utc::now()).ok_or_else(|| {
            ToolFailure::new(FailureKind::DataShapeError, "forecast returned an empty time axis")
        })?;
        let record = series_record(&series, index)?;

        let summary = format!(
            "The weather in {city} is {} with a temperature of {}°C, relative humidity of {}% and a dew point of {}°C",
            record["weather_description"].as_str().unwrap_or_default(),
            record["temperature_c"],
            record["humidity_percent"],
            record["dew_point_c"],
        );
        Ok(ToolReply::new(json!({
            "city": city,
            "latitude": coordinates.latitude,
            "longitude": coordinates.longitude,
            "current": record,
        }))
        .with_summary(summary))
    }
}

/// `weather_by_date_range`: geocode, fetch the hourly forecast between two
/// dates, return one record per hour.
pub struct WeatherByDateRange {
    client: Arc<WeatherClient>,
}

impl WeatherByDateRange {
    pub fn new(client: Arc<WeatherClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for WeatherByDateRange {
    fn name(&self) -> &'static str {
        "weather_by_date_range"
    }

    fn description(&self) -> &'static str {
        "Get hourly weather for a city between two dates (inclusive)"
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("city", ParamKind::String, "City name, English")
            .required("start_date", ParamKind::Date, "Start date, YYYY-MM-DD")
            .required("end_date", ParamKind::Date, "End date, YYYY-MM-DD")
    }

    async fn call(&self, params: Params) -> Result<ToolReply, ToolFailure> {
        let city = params.str("city")?;
        let start = params.date("start_date")?;
        let end = params.date("end_date")?;
        if end < start {
            return Err(ToolFailure::invalid_parameter(
                "end_date",
                "end_date must not precede start_date",
            ));
        }

        let coordinates = self.client.coordinates(city).await?;
        let range = ForecastRange::Dates {
            start: start.format("%Y-%m-%d").to_string(),
            end: end.format("%Y-%m-%d").to_string(),
        };
        let series = self.client.hourly(coordinates, &range).await?;

        let hours = series.time.len();
        let aligned = series.temperature_2m.len() == hours
            && series.relative_humidity_2m.len() == hours
            && series.dew_point_2m.len() == hours
            && series.weather_code.len() == hours;
        if !aligned {
            return Err(ToolFailure::new(
                FailureKind::DataShapeError,
                "hourly series are not aligned with the time axis",
            ));
        }
        let records = (0..hours)
            .map(|index| series_record(&series, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ToolReply::new(json!({
            "city": city,
            "start_date": start.format("%Y-%m-%d").to_string(),
            "end_date": end.format("%Y-%m-%d").to_string(),
            "weather": records,
        }))
        .with_summary(format!("{hours} hourly records for {city}")))
    }
}

/// `current_datetime`: current time in an IANA timezone. No network.
pub struct CurrentDatetime;

#[async_trait]
impl ToolHandler for CurrentDatetime {
    fn name(&self) -> &'static str {
        "current_datetime"
    }

    fn description(&self) -> &'static str {
        "Get the current time in an IANA timezone"
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new().optional_with_default(
            "timezone",
            ParamKind::String,
            "IANA timezone name, e.g. 'Europe/Berlin'; defaults to UTC",
            json!("UTC"),
        )
    }

    async fn call(&self, params: Params) -> Result<ToolReply, ToolFailure> {
        let name = params.str("timezone")?;
        let tz: Tz = name.parse().map_err(|_| {
            ToolFailure::invalid_parameter("timezone", format!("invalid timezone '{name}'"))
        })?;
        let now = Utc::now().with_timezone(&tz);
        Ok(ToolReply::new(json!({
            "timezone": name,
            "datetime": now.to_rfc3339_opts(SecondsFormat::Secs, false),
        })))
    }
}

/// All weather tools over one shared client.
pub fn tools(client: Arc<WeatherClient>) -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(CurrentWeather::new(client.clone())),
        Arc::new(WeatherByDateRange::new(client)),
        Arc::new(CurrentDatetime),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use toolgate_client::RetryPolicy;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> Arc<WeatherClient> {
        let base = Url::parse(&server.uri()).unwrap();
        Arc::new(WeatherClient::with_base_urls(
            ApiClient::with_policy(reqwest::Client::new(), RetryPolicy::none()),
            base.clone(),
            base,
        ))
    }

    fn geocoding_mock() -> Mock {
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("name", "Yilan"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"latitude": 24.75, "longitude": 121.75}]
            })))
    }

    fn hourly_body() -> Value {
        json!({
            "hourly": {
                "time": ["2025-04-10T00:00", "2025-04-10T01:00", "2025-04-10T02:00"],
                "temperature_2m": [17.2, 16.8, 16.5],
                "relative_humidity_2m": [88.0, 90.0, 91.0],
                "dew_point_2m": [15.2, 15.1, 15.0],
                "weather_code": [3, 61, 63],
            }
        })
    }

    #[test]
    fn closest_index_picks_nearest_instant() {
        let times = vec![
            Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 4, 10, 1, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 4, 10, 2, 0, 0).unwrap(),
        ];
        let now = Utc.with_ymd_and_hms(2025, 4, 10, 1, 20, 0).unwrap();
        assert_eq!(closest_index(&times, now), Some(1));

        let late = Utc.with_ymd_and_hms(2025, 4, 11, 9, 0, 0).unwrap();
        assert_eq!(closest_index(&times, late), Some(2));

        assert_eq!(closest_index(&[], now), None);
    }

    #[test]
    fn parse_hour_reads_open_meteo_timestamps() {
        let parsed = parse_hour("2025-04-10T07:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 4, 10, 7, 0, 0).unwrap());
        assert!(parse_hour("not-a-time").is_err());
    }

    #[tokio::test]
    async fn current_weather_chains_geocode_then_forecast() {
        let server = MockServer::start().await;
        geocoding_mock().expect(1).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("timezone", "GMT"))
            .and(query_param("forecast_days", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hourly_body()))
            .expect(1)
            .mount(&server)
            .await;

        let tool = CurrentWeather::new(client_for(&server));
        let params = tool.schema().validate(&json!({"city": "Yilan"})).unwrap();
        let reply = tool.call(params).await.unwrap();

        assert_eq!(reply.data["city"], "Yilan");
        let summary = reply.summary.unwrap();
        assert!(summary.starts_with("The weather in Yilan is"));
    }

    #[tokio::test]
    async fn geocoding_failure_short_circuits_the_chain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hourly_body()))
            .expect(0)
            .mount(&server)
            .await;

        let tool = CurrentWeather::new(client_for(&server));
        let params = tool.schema().validate(&json!({"city": "Yilan"})).unwrap();
        let failure = tool.call(params).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::DataShapeError);
    }

    #[tokio::test]
    async fn date_range_returns_one_record_per_hour() {
        let server = MockServer::start().await;
        geocoding_mock().mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("start_date", "2025-04-10"))
            .and(query_param("end_date", "2025-04-10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hourly_body()))
            .mount(&server)
            .await;

        let tool = WeatherByDateRange::new(client_for(&server));
        let params = tool
            .schema()
            .validate(&json!({
                "city": "Yilan",
                "start_date": "2025-04-10",
                "end_date": "2025-04-10",
            }))
            .unwrap();
        let reply = tool.call(params).await.unwrap();

        let records = reply.data["weather"].as_array().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1]["weather_description"], "Slight rain");
    }

    #[tokio::test]
    async fn reversed_date_range_is_rejected_before_any_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tool = WeatherByDateRange::new(client_for(&server));
        let params = tool
            .schema()
            .validate(&json!({
                "city": "Yilan",
                "start_date": "2025-04-11",
                "end_date": "2025-04-10",
            }))
            .unwrap();
        let failure = tool.call(params).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidParameter);
    }

    #[tokio::test]
    async fn current_datetime_rejects_unknown_zone() {
        let tool = CurrentDatetime;
        let params = tool
            .schema()
            .validate(&json!({"timezone": "Mars/Olympus"}))
            .unwrap();
        let failure = tool.call(params).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidParameter);
    }

    #[tokio::test]
    async fn current_datetime_defaults_to_utc() {
        let tool = CurrentDatetime;
        let params = tool.schema().validate(&json!({})).unwrap();
        let reply = tool.call(params).await.unwrap();
        assert_eq!(reply.data["timezone"], "UTC");
        assert!(reply.data["datetime"].as_str().unwrap().contains('T'));
    }
}
