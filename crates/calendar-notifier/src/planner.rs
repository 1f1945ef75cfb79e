//! Interval planning state machine.
//!
//! ```text
//!            begin (guard idle)            complete(Ok)
//!   Idle ─────────────────────► Planning ───────────────► Idle
//!    ▲  │                          │
//!    │  │ begin (guard busy)       │ complete(Err), below bound
//!    │  ▼                          ▼
//!    │ Deferred               AwaitingRetry
//!    │                             │
//!    └─────── complete(Err), bound reached (abandon) ◄──┘
//! ```
//!
//! The planner owns every piece of mutable planning state (pending guard,
//! retry counter, action id allocation) and performs no I/O: callers feed it
//! the current time and query results and act on the returned steps.

use chrono::{DateTime, Utc};
use shared_types::CalendarEvent;
use std::time::Duration;

use crate::config::NotifierConfig;
use crate::error::SourceError;
use crate::guard::PendingGuard;
use crate::retry::{RetryController, RetryDecision};
use crate::scheduler::{ActionId, ActionScheduler, ArmedAction};
use crate::window::{to_delta, PlanWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerPhase {
    Idle,
    /// A query for this window is in flight
    Planning { window: PlanWindow },
    /// A failed query will be retried at this instant
    AwaitingRetry { at: DateTime<Utc> },
    /// Armed actions were still pending at the last attempt
    Deferred { until: DateTime<Utc> },
}

/// What the caller must do after [`IntervalPlanner::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStep {
    /// Query the event source for this window
    Query(PlanWindow),
    /// Pending actions block planning. Re-plan after `replan_in` if set,
    /// otherwise leave it to the periodic driver.
    Defer {
        until: DateTime<Utc>,
        replan_in: Option<Duration>,
    },
    /// A query is already outstanding; nothing to do
    InFlight,
}

/// Result of feeding a query outcome to [`IntervalPlanner::complete`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// Arm these actions (each followed by a release)
    Scheduled(Vec<ArmedAction>),
    /// Re-plan after `after`
    Retry { after: Duration, errors: u32 },
    /// Retry bound reached; no re-plan for this cycle
    Abandoned { errors: u32 },
}

#[derive(Debug)]
pub struct IntervalPlanner {
    poll_interval: Duration,
    overlap: Duration,
    lead_time: Duration,
    busy_epsilon: Duration,
    guard: PendingGuard,
    retry: RetryController,
    scheduler: ActionScheduler,
    phase: PlannerPhase,
}

impl IntervalPlanner {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            overlap: config.overlap(),
            lead_time: config.lead_time(),
            busy_epsilon: config.busy_epsilon(),
            guard: PendingGuard::new(config.guard_policy),
            retry: RetryController::new(config.max_errors, config.retry_delay()),
            scheduler: ActionScheduler::new(),
            phase: PlannerPhase::Idle,
        }
    }

    pub fn window_at(&self, now: DateTime<Utc>) -> PlanWindow {
        PlanWindow::compute(now, self.lead_time, self.poll_interval, self.overlap)
    }

    /// Start a planning attempt, deciding from the current guard snapshot only
    pub fn begin(&mut self, now: DateTime<Utc>) -> PlanStep {
        if let PlannerPhase::Planning { window } = self.phase {
            tracing::debug!(
                "Query for window {} - {} still in flight, skipping",
                window.start,
                window.end
            );
            return PlanStep::InFlight;
        }

        let window = self.window_at(now);

        if let Some(until) = self.guard.busy_until() {
            tracing::info!("We had pending events at: {}", until);
            let delay = (until - now).abs() + to_delta(self.busy_epsilon);
            let replan_in = delay
                .to_std()
                .ok()
                .filter(|delay| *delay < self.poll_interval);

            match replan_in {
                Some(delay) => tracing::info!("Re-planning in {} ms", delay.as_millis()),
                None => tracing::debug!("Pending events outlast the poll interval"),
            }

            self.phase = PlannerPhase::Deferred { until };
            return PlanStep::Defer { until, replan_in };
        }

        tracing::debug!("Planning window {} - {}", window.start, window.end);
        self.phase = PlannerPhase::Planning { window };
        PlanStep::Query(window)
    }

    /// Apply the outcome of the query issued for `window`
    pub fn complete(
        &mut self,
        now: DateTime<Utc>,
        window: PlanWindow,
        result: Result<Vec<CalendarEvent>, SourceError>,
    ) -> PlanOutcome {
        match result {
            Ok(events) => {
                self.retry.reset();
                let armed = self
                    .scheduler
                    .schedule(&window, &events, now, &mut self.guard);
                tracing::info!(
                    "Fetched {} events, armed {} actions",
                    events.len(),
                    armed.len()
                );
                self.phase = PlannerPhase::Idle;
                PlanOutcome::Scheduled(armed)
            }
            Err(e) => {
                tracing::error!("The calendar request returned an error: {}", e);
                match self.retry.on_failure() {
                    RetryDecision::Retry { after, errors } => {
                        tracing::warn!(
                            "We have {} errors in a row, retrying in {:?}",
                            errors,
                            after
                        );
                        self.phase = PlannerPhase::AwaitingRetry {
                            at: now + to_delta(after),
                        };
                        PlanOutcome::Retry { after, errors }
                    }
                    RetryDecision::Abandon { errors } => {
                        tracing::warn!(
                            "We gave up on this planning interval after {} errors in a row",
                            errors
                        );
                        self.phase = PlannerPhase::Idle;
                        PlanOutcome::Abandoned { errors }
                    }
                }
            }
        }
    }

    /// An armed action fired; release its hold on the guard
    pub fn release(&mut self, id: ActionId) {
        self.guard.release(id);
        if !self.guard.is_busy() {
            if let PlannerPhase::Deferred { .. } = self.phase {
                self.phase = PlannerPhase::Idle;
            }
        }
    }

    pub fn phase(&self) -> PlannerPhase {
        self.phase
    }

    pub fn guard(&self) -> &PendingGuard {
        &self.guard
    }

    pub fn errors_in_a_row(&self) -> u32 {
        self.retry.errors()
    }
}
