//! Time-window derivation for production-line queries.
//!
//! Pure functions with exhaustive matches over the enumerated codes; an
//! unmapped code never reaches this module, it is rejected at validation.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use toolgate_core::ToolFailure;

pub const SHIFT_LABELS: &[&str] = &["day", "night", "all"];
pub const FRAME_SPAN_CODES: &[i64] = &[1, 2, 3, 4];

/// Fixed snapshot hour the history endpoint expects for daily buckets.
const DAILY_SNAPSHOT_HOUR: u32 = 16;

/// Daily shift window selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    /// 04:00–12:00 UTC.
    Day,
    /// 12:00–20:00 UTC.
    Night,
    /// 04:00–20:00 UTC, the union of both shifts.
    All,
}

impl Shift {
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "day" => Some(Self::Day),
            "night" => Some(Self::Night),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Night => "night",
            Self::All => "all",
        }
    }

    /// UTC window of this shift on the given date.
    #[must_use]
    pub fn window_utc(self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let at = |hour: u32| {
            let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
            Utc.from_utc_datetime(&date.and_time(time))
        };
        match self {
            Self::Day => (at(4), at(12)),
            Self::Night => (at(12), at(20)),
            Self::All => (at(4), at(20)),
        }
    }
}

/// Time-bucket granularity of a production-history query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSpan {
    TenMinutes,
    Hour,
    Day,
    Month,
}

impl FrameSpan {
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::TenMinutes),
            2 => Some(Self::Hour),
            3 => Some(Self::Day),
            4 => Some(Self::Month),
            _ => None,
        }
    }

    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::TenMinutes => 1,
            Self::Hour => 2,
            Self::Day => 3,
            Self::Month => 4,
        }
    }
}

/// Format an instant the way the upstream endpoints expect it,
/// `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn format_utc_ms(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Normalize caller-supplied history bounds (`YYYY-MM-DDTHH:MM:SS`) for the
/// given frame span. Daily buckets pin both bounds to the fixed snapshot
/// hour; all other spans pass the instant through with millisecond precision.
pub fn frame_bounds(
    span: FrameSpan,
    start: &str,
    end: &str,
) -> Result<(String, String), ToolFailure> {
    let normalize = |name: &'static str, text: &str| -> Result<String, ToolFailure> {
        let parsed = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").map_err(|e| {
            ToolFailure::invalid_parameter(
                name,
                format!("parameter '{name}' must be YYYY-MM-DDTHH:MM:SS: {e}"),
            )
        })?;
        let instant = if span == FrameSpan::Day {
            parsed
                .date()
                .and_hms_opt(DAILY_SNAPSHOT_HOUR, 0, 0)
                .unwrap_or(parsed)
        } else {
            parsed
        };
        Ok(format_utc_ms(Utc.from_utc_datetime(&instant)))
    };
    Ok((normalize("start_time", start)?, normalize("end_time", end)?))
}

/// The previous full UTC day: yesterday 00:00 to today 00:00.
#[must_use]
pub fn previous_utc_day(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now
        .with_hour(0)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    (today - Duration::days(1), today)
}
