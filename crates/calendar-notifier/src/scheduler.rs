use chrono::{DateTime, Utc};
use shared_types::{ActionKind, CalendarEvent};
use std::fmt;
use std::time::Duration;

use crate::guard::PendingGuard;
use crate::window::{delay_until, PlanWindow};

/// Identifies one armed action and its release
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An action to fire at a future instant, followed by a guard release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedAction {
    pub id: ActionId,
    pub kind: ActionKind,
    pub summary: String,
    pub at: DateTime<Utc>,
    pub delay: Duration,
}

impl ArmedAction {
    pub fn message(&self) -> String {
        self.kind.message(&self.summary)
    }
}

/// Turns fetched events into armed start/end actions
#[derive(Debug, Default)]
pub struct ActionScheduler {
    next_id: u64,
}

impl ActionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a start action for every event starting inside the window and an
    /// end action for every event ending inside it, marking the guard busy
    /// for each. Events are handled independently, in the order given.
    pub fn schedule(
        &mut self,
        window: &PlanWindow,
        events: &[CalendarEvent],
        now: DateTime<Utc>,
        guard: &mut PendingGuard,
    ) -> Vec<ArmedAction> {
        let mut armed = Vec::new();

        for (kind, event, at) in Self::actions_for(window, events) {
            let id = self.allocate_id();
            guard.mark_busy_until(id, at);
            armed.push(ArmedAction {
                id,
                kind,
                summary: event.summary.clone(),
                at,
                delay: delay_until(now, at),
            });
        }

        armed
    }

    /// Which actions a window would arm, without touching any state
    pub fn actions_for<'a>(
        window: &'a PlanWindow,
        events: &'a [CalendarEvent],
    ) -> impl Iterator<Item = (ActionKind, &'a CalendarEvent, DateTime<Utc>)> + 'a {
        events.iter().flat_map(move |event| {
            let start = window
                .admits_start(event.start)
                .then_some((ActionKind::Start, event, event.start));
            let end = window
                .admits_end(event.end)
                .then_some((ActionKind::End, event, event.end));
            start.into_iter().chain(end)
        })
    }

    fn allocate_id(&mut self) -> ActionId {
        self.next_id += 1;
        ActionId(self.next_id)
    }
}
