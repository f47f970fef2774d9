//! Latest-state aggregation over the current equipment message feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One record from the current-equipment-message endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentMessage {
    pub category: String,
    pub station_id: String,
    pub line_name: String,
    pub group_name: String,
    pub station_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub message_id: String,
}

/// Accumulated fault state of one station.
#[derive(Debug, Clone, Serialize)]
pub struct StationStatus {
    pub line_name: String,
    pub group_name: String,
    pub station_name: String,
    pub latest_message: String,
    pub latest_timestamp: DateTime<Utc>,
    pub latest_category: String,
    pub error_count: u32,
    pub message_codes: BTreeSet<String>,
}

/// Group messages by station, keeping the most recent record per station.
///
/// Only `Error` records pass the filter, plus `Warning` when requested.
/// Every matching record counts toward `error_count` and contributes its
/// message code; a strictly greater timestamp replaces the latest record, so
/// an equal timestamp keeps the first-seen record. The map is keyed by
/// station id, giving deterministic output order.
pub fn latest_state_by_station(
    messages: &[EquipmentMessage],
    include_warnings: bool,
) -> BTreeMap<String, StationStatus> {
    let mut stations: BTreeMap<String, StationStatus> = BTreeMap::new();
    for message in messages {
        let matches = message.category == "Error"
            || (include_warnings && message.category == "Warning");
        if !matches {
            continue;
        }
        let status = stations
            .entry(message.station_id.clone())
            .or_insert_with(|| StationStatus {
                line_name: message.line_name.clone(),
                group_name: message.group_name.clone(),
                station_name: message.station_name.clone(),
                latest_message: message.text.clone(),
                latest_timestamp: message.timestamp,
                latest_category: message.category.clone(),
                error_count: 0,
                message_codes: BTreeSet::new(),
            });
        status.error_count += 1;
        status.message_codes.insert(message.message_id.clone());
        if message.timestamp > status.latest_timestamp {
            status.latest_message = message.text.clone();
            status.latest_timestamp = message.timestamp;
            status.latest_category = message.category.clone();
        }
    }
    stations
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(
        station_id: &str,
        category: &str,
        seconds: u32,
        message_id: &str,
        text: &str,
    ) -> EquipmentMessage {
        EquipmentMessage {
            category: category.to_string(),
            station_id: station_id.to_string(),
            line_name: "Line 1".to_string(),
            group_name: "Assembly".to_string(),
            station_name: format!("Station {station_id}"),
            text: text.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, seconds).unwrap(),
            message_id: message_id.to_string(),
        }
    }

    #[test]
    fn keeps_latest_record_and_counts_every_match() {
        let messages = vec![
            message("A", "Error", 10, "E01", "motor overload"),
            message("A", "Error", 20, "E02", "motor stalled"),
            message("B", "Warning", 15, "W01", "torque near limit"),
        ];

        let stations = latest_state_by_station(&messages, false);
        assert_eq!(stations.len(), 1);

        let a = &stations["A"];
        assert_eq!(a.error_count, 2);
        assert_eq!(
            a.latest_timestamp,
            Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, 20).unwrap()
        );
        assert_eq!(a.latest_message, "motor stalled");
        assert_eq!(
            a.message_codes.iter().collect::<Vec<_>>(),
            vec!["E01", "E02"]
        );
    }

    #[test]
    fn warnings_are_included_on_request() {
        let messages = vec![
            message("A", "Error", 10, "E01", "motor overload"),
            message("B", "Warning", 15, "W01", "torque near limit"),
        ];

        let stations = latest_state_by_station(&messages, true);
        assert_eq!(stations.len(), 2);
        assert_eq!(stations["B"].latest_category, "Warning");
    }

    #[test]
    fn equal_timestamps_keep_the_first_seen_record() {
        let messages = vec![
            message("A", "Error", 10, "E01", "first"),
            message("A", "Error", 10, "E02", "second"),
        ];

        let stations = latest_state_by_station(&messages, false);
        let a = &stations["A"];
        assert_eq!(a.latest_message, "first");
        assert_eq!(a.error_count, 2);
        assert_eq!(a.message_codes.len(), 2);
    }

    #[test]
    fn duplicate_message_codes_are_deduplicated() {
        let messages = vec![
            message("A", "Error", 10, "E01", "again"),
            message("A", "Error", 12, "E01", "again"),
        ];

        let stations = latest_state_by_station(&messages, false);
        assert_eq!(stations["A"].error_count, 2);
        assert_eq!(stations["A"].message_codes.len(), 1);
    }

    #[test]
    fn other_categories_never_pass_the_filter() {
        let messages = vec![message("A", "Info", 10, "I01", "door opened")];
        assert!(latest_state_by_station(&messages, true).is_empty());
    }
}
