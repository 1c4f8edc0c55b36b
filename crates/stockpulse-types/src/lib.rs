use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored enum label is not recognized.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

// ──────────────────── Interval Classes ────────────────────

/// The periodic channels a trigger source can fire on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalClass {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "60min")]
    SixtyMinutes,
}

impl IntervalClass {
    /// All supported classes, shortest first.
    pub const ALL: [IntervalClass; 5] = [
        IntervalClass::OneMinute,
        IntervalClass::FiveMinutes,
        IntervalClass::FifteenMinutes,
        IntervalClass::ThirtyMinutes,
        IntervalClass::SixtyMinutes,
    ];

    /// Resolve a wire label such as `"15min"`. Returns `None` for unknown labels.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "1min" => Some(Self::OneMinute),
            "5min" => Some(Self::FiveMinutes),
            "15min" => Some(Self::FifteenMinutes),
            "30min" => Some(Self::ThirtyMinutes),
            "60min" => Some(Self::SixtyMinutes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1min",
            Self::FiveMinutes => "5min",
            Self::FifteenMinutes => "15min",
            Self::ThirtyMinutes => "30min",
            Self::SixtyMinutes => "60min",
        }
    }

    /// Nominal period of this channel in minutes.
    pub fn minutes(&self) -> u32 {
        match self {
            Self::OneMinute => 1,
            Self::FiveMinutes => 5,
            Self::FifteenMinutes => 15,
            Self::ThirtyMinutes => 30,
            Self::SixtyMinutes => 60,
        }
    }
}

impl fmt::Display for IntervalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ──────────────────── Trigger Events ────────────────────

/// Source label used by the background scheduler on the host platform.
pub const BACKGROUND_SOURCE: &str = "workmanager";

/// Event time as reported by the trigger source: either epoch millis or ISO-8601.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerTimestamp {
    Millis(i64),
    Iso(String),
}

impl TriggerTimestamp {
    /// Convert to a UTC datetime. Returns `None` if the value is out of range or unparsable.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            Self::Iso(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// A periodic signal delivered by a trigger source.
///
/// Field names follow the JSON payload emitted by the native trigger service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Wall-clock time reported by the source.
    pub timestamp: TriggerTimestamp,
    /// Interval class label (e.g. "5min"). Kept raw so unknown labels survive parsing.
    pub interval: String,
    /// Advisory counter of firings on this channel.
    #[serde(default)]
    pub interval_count: u64,
    /// Advisory minute counter of the trigger source.
    #[serde(default)]
    pub total_minutes: u64,
    /// Epoch millis at which the source produced the event.
    pub current_time: i64,
    /// Producer of the event ("workmanager" for the background scheduler).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Epoch millis at which a background event was queued while the app was inactive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<i64>,
}

impl TriggerEvent {
    /// Build a live trigger for the given class.
    pub fn live(interval: IntervalClass, interval_count: u64, total_minutes: u64, now_ms: i64) -> Self {
        Self {
            timestamp: TriggerTimestamp::Millis(now_ms),
            interval: interval.as_str().to_string(),
            interval_count,
            total_minutes,
            current_time: now_ms,
            source: None,
            stored_at: None,
        }
    }

    /// True when this is a catch-up delivery of a trigger queued while the app was inactive.
    pub fn is_replay(&self) -> bool {
        self.source.as_deref() == Some(BACKGROUND_SOURCE) && self.stored_at.is_some()
    }

    /// Resolve the interval label, if it names a supported class.
    pub fn interval_class(&self) -> Option<IntervalClass> {
        IntervalClass::from_label(&self.interval)
    }
}

// ──────────────────── Execution Log Types ────────────────────

/// Which layer produced the trigger that led to an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOrigin {
    Javascript,
    Java,
    Native,
}

impl TriggerOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Javascript => "javascript",
            Self::Java => "java",
            Self::Native => "native",
        }
    }
}

impl FromStr for TriggerOrigin {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "javascript" => Ok(Self::Javascript),
            "java" => Ok(Self::Java),
            "native" => Ok(Self::Native),
            other => Err(UnknownLabel {
                kind: "trigger source",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Application lifecycle state at the time of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Active,
    Background,
    Closed,
}

impl AppState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Background => "background",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for AppState {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "background" => Ok(Self::Background),
            "closed" => Ok(Self::Closed),
            other => Err(UnknownLabel {
                kind: "app state",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Optional extra columns attached to an execution record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionDetails {
    #[serde(default)]
    pub user_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ExecutionDetails {
    pub fn with_notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Self::default()
        }
    }
}

/// One row of the execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub task_name: String,
    pub execution_time: DateTime<Utc>,
    pub trigger_source: TriggerOrigin,
    pub app_state: AppState,
    pub user_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated execution counts per task, trigger source and app state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStats {
    pub task_name: String,
    pub execution_count: i64,
    pub last_execution: DateTime<Utc>,
    pub trigger_source: TriggerOrigin,
    pub app_state: AppState,
}

// ──────────────────── Task Status ────────────────────

/// Snapshot of a registered task for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: String,
    pub name: String,
    pub interval_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    /// `None` means the task runs on the next matching trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_payload_parse() {
        let json = r#"{"timestamp":1700000000000,"interval":"5min","interval_count":3,"total_minutes":15,"current_time":1700000000000}"#;
        let event: TriggerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.interval_class(), Some(IntervalClass::FiveMinutes));
        assert_eq!(event.interval_count, 3);
        assert!(!event.is_replay());
        assert_eq!(
            event.timestamp.to_datetime().unwrap().timestamp_millis(),
            1700000000000
        );
    }

    #[test]
    fn test_iso_timestamp_parse() {
        let json = r#"{"timestamp":"2024-01-01T00:00:00.000Z","interval":"1min","current_time":1704067200000}"#;
        let event: TriggerEvent = serde_json::from_str(json).unwrap();
        let dt = event.timestamp.to_datetime().unwrap();
        assert_eq!(dt.timestamp_millis(), 1704067200000);
        assert_eq!(event.interval_count, 0);
    }

    #[test]
    fn test_replay_requires_source_and_stored_at() {
        let live_bg = r#"{"timestamp":1,"interval":"15min","current_time":1,"source":"workmanager"}"#;
        let event: TriggerEvent = serde_json::from_str(live_bg).unwrap();
        assert!(!event.is_replay());

        let replay = r#"{"timestamp":1,"interval":"15min","current_time":1,"source":"workmanager","stored_at":5}"#;
        let event: TriggerEvent = serde_json::from_str(replay).unwrap();
        assert!(event.is_replay());

        let other = r#"{"timestamp":1,"interval":"15min","current_time":1,"source":"other","stored_at":5}"#;
        let event: TriggerEvent = serde_json::from_str(other).unwrap();
        assert!(!event.is_replay());
    }

    #[test]
    fn test_unknown_interval_survives_parsing() {
        let json = r#"{"timestamp":1,"interval":"2min","current_time":1}"#;
        let event: TriggerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.interval, "2min");
        assert!(event.interval_class().is_none());
    }

    #[test]
    fn test_interval_class_labels() {
        for class in IntervalClass::ALL {
            assert_eq!(IntervalClass::from_label(class.as_str()), Some(class));
        }
        assert_eq!(IntervalClass::SixtyMinutes.minutes(), 60);
        let json = serde_json::to_string(&IntervalClass::FifteenMinutes).unwrap();
        assert_eq!(json, "\"15min\"");
    }

    #[test]
    fn test_origin_and_state_labels() {
        assert_eq!("java".parse::<TriggerOrigin>().unwrap(), TriggerOrigin::Java);
        assert_eq!("background".parse::<AppState>().unwrap(), AppState::Background);
        let err = "sleeping".parse::<AppState>().unwrap_err();
        assert_eq!(err.to_string(), "unknown app state: sleeping");
    }
}
