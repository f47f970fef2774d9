//! Reshaping of management-report payloads and the analysis prompt.

use serde::Serialize;
use serde_json::Value;

/// How many fault events the analysis prompt carries.
const PROMPT_EVENT_LIMIT: usize = 10;

/// One fault event from the report-messages endpoint, flattened.
#[derive(Debug, Clone, Serialize)]
pub struct MessageSummary {
    pub station: String,
    pub fault_text: String,
    pub count: u64,
    pub duration_seconds: f64,
}

/// Cycle-time comparison for one station.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub station: String,
    pub median_seconds: f64,
    pub nominal_seconds: f64,
    pub deviation_percent: f64,
}

/// Percentage difference between an observed median and a nominal reference,
/// rounded to one decimal. A zero or missing reference yields the neutral
/// default instead of a division error.
#[must_use]
pub fn cycle_time_deviation(median: f64, nominal: f64) -> f64 {
    if nominal == 0.0 {
        return 0.0;
    }
    ((median / nominal - 1.0) * 1000.0).round() / 10.0
}

/// Flatten report-message records into summaries, sorted by accumulated
/// downtime descending. Records without a station are dropped.
#[must_use]
pub fn summarize_report_messages(payload: &Value) -> Vec<MessageSummary> {
    let mut summaries: Vec<MessageSummary> = payload
        .as_array()
        .map(|records| {
            records
                .iter()
                .filter_map(|record| {
                    let station = record
                        .get("stations")
                        .and_then(Value::as_array)
                        .and_then(|stations| stations.first())
                        .and_then(Value::as_str)?
                        .to_string();
                    Some(MessageSummary {
                        station,
                        fault_text: record
                            .get("messageText")
                            .and_then(Value::as_str)
                            .unwrap_or("no description")
                            .to_string(),
                        count: record.get("count").and_then(Value::as_u64).unwrap_or(0),
                        duration_seconds: record
                            .get("duration")
                            .and_then(Value::as_f64)
                            .unwrap_or(0.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    summaries.sort_by(|a, b| {
        b.duration_seconds
            .partial_cmp(&a.duration_seconds)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    summaries
}

/// Flatten process-time records into per-station cycle comparisons. Records
/// without the `item1` block are dropped; missing numbers default to zero and
/// the deviation guard keeps them neutral.
#[must_use]
pub fn summarize_process_times(payload: &Value) -> Vec<ProcessSummary> {
    payload
        .as_array()
        .map(|records| {
            records
                .iter()
                .filter_map(|record| {
                    let item = record.get("item1")?.as_object()?;
                    let median = item.get("median").and_then(Value::as_f64).unwrap_or(0.0);
                    let nominal = item
                        .get("nominalCycleTime")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    Some(ProcessSummary {
                        station: item
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown station")
                            .to_string(),
                        median_seconds: median,
                        nominal_seconds: nominal,
                        deviation_percent: cycle_time_deviation(median, nominal),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Compose the analysis prompt from the reshaped summaries.
#[must_use]
pub fn build_analysis_prompt(messages: &[MessageSummary], processes: &[ProcessSummary]) -> String {
    let top_events = &messages[..messages.len().min(PROMPT_EVENT_LIMIT)];
    let events_json = serde_json::to_string(top_events).unwrap_or_else(|_| "[]".to_string());
    let processes_json = serde_json::to_string(processes).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Analyze the production line's capacity bottlenecks along two dimensions, \
technical availability and cycle time. Keep the answer concise.\n\
Notes:\n\
1. Check whether alarm messages point at equipment hardware or software faults, \
i.e. whether downtime is directly caused by the equipment itself. \
A technical stop references an equipment component (for example 'motor overload E01'); \
a non-technical stop describes a process parameter out of range (for example 'force/torque limit exceeded').\n\
2. Compare the actual median cycle time against the nominal cycle time per station.\n\
\n\
Fault events, ordered by accumulated downtime:\n{events_json}\n\
\n\
Station cycle times, actual median versus nominal:\n{processes_json}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deviation_compares_median_against_nominal() {
        assert_eq!(cycle_time_deviation(110.0, 100.0), 10.0);
        assert_eq!(cycle_time_deviation(95.0, 100.0), -5.0);
        assert_eq!(cycle_time_deviation(103.0, 100.0), 3.0);
    }

    #[test]
    fn zero_nominal_yields_neutral_default() {
        assert_eq!(cycle_time_deviation(110.0, 0.0), 0.0);
    }

    #[test]
    fn report_messages_sort_by_downtime_and_drop_stationless_records() {
        let payload = json!([
            {"stations": ["S1"], "messageText": "gripper jam", "count": 3, "duration": 120.0},
            {"stations": ["S2"], "messageText": "torque limit", "count": 8, "duration": 480.5},
            {"stations": [], "messageText": "orphan", "count": 1, "duration": 999.0},
            {"messageText": "no stations at all", "count": 1, "duration": 999.0},
        ]);

        let summaries = summarize_report_messages(&payload);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].station, "S2");
        assert_eq!(summaries[0].duration_seconds, 480.5);
        assert_eq!(summaries[1].station, "S1");
    }

    #[test]
    fn missing_message_fields_take_defaults() {
        let payload = json!([{"stations": ["S1"]}]);
        let summaries = summarize_report_messages(&payload);
        assert_eq!(summaries[0].fault_text, "no description");
        assert_eq!(summaries[0].count, 0);
        assert_eq!(summaries[0].duration_seconds, 0.0);
    }

    #[test]
    fn process_times_compare_against_nominal() {
        let payload = json!([
            {"item1": {"name": "S1", "median": 110.0, "nominalCycleTime": 100.0}},
            {"item1": {"name": "S2", "median": 50.0, "nominalCycleTime": 0.0}},
            {"item2": {"name": "ignored"}},
        ]);

        let summaries = summarize_process_times(&payload);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].deviation_percent, 10.0);
        assert_eq!(summaries[1].deviation_percent, 0.0);
    }

    #[test]
    fn prompt_carries_at_most_ten_events() {
        let messages: Vec<MessageSummary> = (0..15)
            .map(|i| MessageSummary {
                station: format!("S{i}"),
                fault_text: "fault".to_string(),
                count: 1,
                duration_seconds: f64::from(i),
            })
            .collect();
        let prompt = build_analysis_prompt(&messages, &[]);
        assert!(prompt.contains("\"S9\""));
        assert!(!prompt.contains("\"S10\""));
    }
}
