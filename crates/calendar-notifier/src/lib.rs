//! Calendar-driven notifier.
//!
//! Polls a calendar for events in an upcoming window and fires one action at
//! each event's start and one at its end. Planning is deferred while earlier
//! actions are still pending, and failed queries are retried a bounded number
//! of times per cycle.

pub mod action;
pub mod calendar_client;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod planner;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod source;
pub mod window;

pub use action::{ActionSink, LogSink};
pub use clock::{Clock, MonotonicClock, SystemClock};
pub use config::{Credentials, GuardPolicy, NotifierConfig};
pub use error::{NotifierError, NotifierResult, SourceError};
pub use planner::{IntervalPlanner, PlanOutcome, PlanStep, PlannerPhase};
pub use service::NotifierService;
pub use source::EventSource;
pub use window::PlanWindow;
