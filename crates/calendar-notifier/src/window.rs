use chrono::{DateTime, Utc};
use std::time::Duration;

/// Forward-looking interval queried for upcoming events.
///
/// `start = now + lead_time`, `end = start + poll_interval + overlap`.
/// Built fresh for every planning attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PlanWindow {
    pub fn compute(
        now: DateTime<Utc>,
        lead_time: Duration,
        poll_interval: Duration,
        overlap: Duration,
    ) -> Self {
        let start = now + to_delta(lead_time);
        let end = start + to_delta(poll_interval) + to_delta(overlap);
        Self { start, end }
    }

    pub fn length(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Event starts are armed only if they are not already past the window start
    pub fn admits_start(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start
    }

    /// Event ends are armed only if they fall before the window end
    pub fn admits_end(&self, instant: DateTime<Utc>) -> bool {
        instant <= self.end
    }
}

/// Convert a std duration, saturating at chrono's maximum
pub(crate) fn to_delta(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Non-negative std delay from `now` until `at`; past instants yield zero
pub(crate) fn delay_until(now: DateTime<Utc>, at: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}
