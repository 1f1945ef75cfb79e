//! Runtime wiring for the planner.
//!
//! One task owns the [`IntervalPlanner`] and is the only place planning
//! state changes. Everything else (periodic driver, remote queries, armed
//! actions, re-plan timers) runs in its own task and reports back over an
//! mpsc channel.

use chrono::{DateTime, Utc};
use shared_types::{ActionKind, CalendarEvent, EventListRequest};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::action::ActionSink;
use crate::clock::Clock;
use crate::config::NotifierConfig;
use crate::error::{NotifierError, NotifierResult, SourceError};
use crate::planner::{IntervalPlanner, PlanOutcome, PlanStep};
use crate::scheduler::{ActionId, ActionScheduler, ArmedAction};
use crate::source::EventSource;
use crate::window::PlanWindow;

/// Why a planning attempt was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Periodic,
    Retry,
    Deferred,
}

#[derive(Debug)]
enum Command {
    Plan(Trigger),
    Queried {
        window: PlanWindow,
        result: Result<Vec<CalendarEvent>, SourceError>,
    },
    Release(ActionId),
}

pub struct NotifierService {
    config: NotifierConfig,
    calendar_id: String,
    source: Arc<dyn EventSource>,
    sink: Arc<dyn ActionSink>,
    clock: Arc<dyn Clock>,
}

impl NotifierService {
    pub fn new(
        config: NotifierConfig,
        calendar_id: impl Into<String>,
        source: Arc<dyn EventSource>,
        sink: Arc<dyn ActionSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            calendar_id: calendar_id.into(),
            source,
            sink,
            clock,
        }
    }

    /// Plan immediately, then every poll interval, until `shutdown` resolves.
    ///
    /// Armed actions that have not fired yet are aborted on shutdown. An
    /// invalid configuration is rejected before anything is planned.
    pub async fn run_until<F>(self, shutdown: F) -> NotifierResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.config.validate()?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut planner = IntervalPlanner::new(&self.config);
        let mut armed: HashMap<ActionId, JoinHandle<()>> = HashMap::new();

        let driver = spawn_periodic_driver(tx.clone(), self.config.poll_interval());
        tracing::info!(
            "Program successfully started (poll interval: {:?}, guard policy: {:?})",
            self.config.poll_interval(),
            self.config.guard_policy
        );

        tokio::pin!(shutdown);

        let result = loop {
            let command = tokio::select! {
                _ = &mut shutdown => break Ok(()),
                command = rx.recv() => match command {
                    Some(command) => command,
                    None => break Err(NotifierError::ChannelClosed),
                },
            };

            match command {
                Command::Plan(trigger) => self.plan(&mut planner, &tx, trigger),
                Command::Queried { window, result } => {
                    let now = self.clock.now();
                    match planner.complete(now, window, result) {
                        PlanOutcome::Scheduled(actions) => {
                            for action in actions {
                                let id = action.id;
                                armed.insert(id, self.arm_action(action, &tx));
                            }
                        }
                        PlanOutcome::Retry { after, .. } => {
                            arm_replan(tx.clone(), after, Trigger::Retry);
                        }
                        PlanOutcome::Abandoned { .. } => {}
                    }
                }
                Command::Release(id) => {
                    planner.release(id);
                    armed.remove(&id);
                }
            }
        };

        driver.abort();
        if !armed.is_empty() {
            tracing::info!("Cancelling {} armed actions", armed.len());
        }
        for (_, handle) in armed.drain() {
            handle.abort();
        }

        result
    }

    fn plan(&self, planner: &mut IntervalPlanner, tx: &UnboundedSender<Command>, trigger: Trigger) {
        tracing::debug!("Planning attempt ({:?})", trigger);

        match planner.begin(self.clock.now()) {
            PlanStep::Query(window) => {
                let request = EventListRequest::ordered_by_start(
                    &self.calendar_id,
                    window.start,
                    window.end,
                    self.config.max_results,
                );
                let source = Arc::clone(&self.source);
                let tx = tx.clone();
                let timeout = self.config.query_timeout();
                tokio::spawn(async move {
                    let result = run_query(source, request, timeout).await;
                    let _ = tx.send(Command::Queried { window, result });
                });
            }
            PlanStep::Defer {
                replan_in: Some(delay),
                ..
            } => arm_replan(tx.clone(), delay, Trigger::Deferred),
            PlanStep::Defer { replan_in: None, .. } | PlanStep::InFlight => {}
        }
    }

    fn arm_action(&self, action: ArmedAction, tx: &UnboundedSender<Command>) -> JoinHandle<()> {
        tracing::debug!(
            "Arming {} action {} for '{}' at {} (in {:?})",
            action.kind,
            action.id,
            action.summary,
            action.at,
            action.delay
        );

        let sink = Arc::clone(&self.sink);
        let tx = tx.clone();
        tokio::spawn(async move {
            time::sleep(action.delay).await;
            sink.fire(&action.message());
            let _ = tx.send(Command::Release(action.id));
        })
    }
}

fn spawn_periodic_driver(tx: UnboundedSender<Command>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if tx.send(Command::Plan(Trigger::Periodic)).is_err() {
                break;
            }
        }
    })
}

/// Run one query in its own task so the planner always hears back, whether
/// the source answers, hangs past `timeout` or panics.
async fn run_query(
    source: Arc<dyn EventSource>,
    request: EventListRequest,
    timeout: Duration,
) -> Result<Vec<CalendarEvent>, SourceError> {
    let query = tokio::spawn(async move { source.list(&request).await });
    let abort = query.abort_handle();

    match time::timeout(timeout, query).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            tracing::error!("Calendar query task failed: {}", e);
            Err(SourceError::request(format!("query task failed: {}", e)))
        }
        Err(_) => {
            abort.abort();
            Err(SourceError::request(format!("timed out after {:?}", timeout)))
        }
    }
}

fn arm_replan(tx: UnboundedSender<Command>, delay: Duration, trigger: Trigger) {
    tokio::spawn(async move {
        time::sleep(delay).await;
        let _ = tx.send(Command::Plan(trigger));
    });
}

/// One event in a preview and the actions planning would arm for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewEntry {
    pub event: CalendarEvent,
    pub actions: Vec<ActionKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub generated_at: DateTime<Utc>,
    pub window: PlanWindow,
    pub entries: Vec<PreviewEntry>,
}

/// Query the window that would be planned now without arming anything
pub async fn preview(
    config: &NotifierConfig,
    calendar_id: &str,
    source: &dyn EventSource,
    clock: &dyn Clock,
) -> NotifierResult<Preview> {
    config.validate()?;

    let now = clock.now();
    let window = IntervalPlanner::new(config).window_at(now);
    let request =
        EventListRequest::ordered_by_start(calendar_id, window.start, window.end, config.max_results);

    let events = time::timeout(config.query_timeout(), source.list(&request))
        .await
        .map_err(|_| {
            SourceError::request(format!("timed out after {:?}", config.query_timeout()))
        })??;

    let entries = events
        .iter()
        .map(|event| PreviewEntry {
            event: event.clone(),
            actions: ActionScheduler::actions_for(&window, std::slice::from_ref(event))
                .map(|(kind, _, _)| kind)
                .collect(),
        })
        .collect();

    Ok(Preview {
        generated_at: now,
        window,
        entries,
    })
}
