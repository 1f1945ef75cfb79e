use async_trait::async_trait;
use shared_types::{CalendarEvent, EventListRequest};

use crate::error::SourceError;

/// Remote calendar queried once per planning attempt.
///
/// Implementations return at most `request.max_results` events ordered by
/// start time. Any failure is reported as a [`SourceError`] and retried by
/// the planner.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn list(&self, request: &EventListRequest) -> Result<Vec<CalendarEvent>, SourceError>;
}
