//! Wall-clock sources for planning.
//!
//! Timers are always driven by tokio; the clock only answers "what time is
//! it" so that window bounds and event instants can be compared.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time derived from a fixed anchor plus tokio's monotonic clock.
///
/// Immune to wall-clock adjustments after startup, and follows tokio's
/// paused/advanced time in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor_wall: DateTime<Utc>,
    anchor_instant: Instant,
}

impl MonotonicClock {
    pub fn new(anchor_wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall,
            anchor_instant: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.anchor_instant.elapsed();
        match chrono::Duration::from_std(elapsed) {
            Ok(delta) => self.anchor_wall + delta,
            Err(_) => self.anchor_wall,
        }
    }
}
