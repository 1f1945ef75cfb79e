//! Pending guard: blocks new plans while armed actions are outstanding.
//!
//! Two policies are supported (see [`GuardPolicy`]):
//!
//! - `LastWriteWins`: a single `until` slot overwritten by every mark, and
//!   any release clears the guard even if other actions are still armed.
//! - `Outstanding`: one entry per armed action; the guard stays busy until
//!   the last of them releases and reports the latest outstanding instant.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::config::GuardPolicy;
use crate::scheduler::ActionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Idle,
    Busy { until: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct PendingGuard {
    policy: GuardPolicy,
    last_until: Option<DateTime<Utc>>,
    outstanding: BTreeMap<ActionId, DateTime<Utc>>,
}

impl PendingGuard {
    pub fn new(policy: GuardPolicy) -> Self {
        Self {
            policy,
            last_until: None,
            outstanding: BTreeMap::new(),
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state(), PendingState::Busy { .. })
    }

    pub fn state(&self) -> PendingState {
        let until = match self.policy {
            GuardPolicy::LastWriteWins => self.last_until,
            GuardPolicy::Outstanding => self.outstanding.values().max().copied(),
        };
        match until {
            Some(until) => PendingState::Busy { until },
            None => PendingState::Idle,
        }
    }

    pub fn busy_until(&self) -> Option<DateTime<Utc>> {
        match self.state() {
            PendingState::Busy { until } => Some(until),
            PendingState::Idle => None,
        }
    }

    /// Record an action armed for `until`
    pub fn mark_busy_until(&mut self, id: ActionId, until: DateTime<Utc>) {
        match self.policy {
            GuardPolicy::LastWriteWins => self.last_until = Some(until),
            GuardPolicy::Outstanding => {
                self.outstanding.insert(id, until);
            }
        }
    }

    /// Release the action with the given id
    pub fn release(&mut self, id: ActionId) {
        match self.policy {
            GuardPolicy::LastWriteWins => self.last_until = None,
            GuardPolicy::Outstanding => {
                self.outstanding.remove(&id);
            }
        }
    }

    /// Number of armed actions still tracked (always 0 or 1 slot for last-write-wins)
    pub fn outstanding(&self) -> usize {
        match self.policy {
            GuardPolicy::LastWriteWins => usize::from(self.last_until.is_some()),
            GuardPolicy::Outstanding => self.outstanding.len(),
        }
    }
}
