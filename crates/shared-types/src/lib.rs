use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single calendar event as returned by an event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn new(summary: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            summary: summary.into(),
            start,
            end,
        }
    }
}

/// Which edge of an event an armed action fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Start,
    End,
}

impl ActionKind {
    /// Verb used in the fired message ("begins" / "ends")
    pub fn verb(&self) -> &'static str {
        match self {
            ActionKind::Start => "begins",
            ActionKind::End => "ends",
        }
    }

    /// Message fired for an event with the given summary
    pub fn message(&self, summary: &str) -> String {
        format!("Event Named: {} {}", summary, self.verb())
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Start => write!(f, "start"),
            ActionKind::End => write!(f, "end"),
        }
    }
}

/// Request sent to an event source for one planning window.
///
/// Field names follow the Calendar v3 `events.list` query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListRequest {
    pub calendar_id: String,
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    pub max_results: u32,
    pub single_events: bool,
    pub order_by: String,
}

impl EventListRequest {
    /// Build a request for single (expanded) events ordered by start time
    pub fn ordered_by_start(
        calendar_id: impl Into<String>,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: u32,
    ) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            time_min,
            time_max,
            max_results,
            single_events: true,
            order_by: "startTime".to_string(),
        }
    }
}
