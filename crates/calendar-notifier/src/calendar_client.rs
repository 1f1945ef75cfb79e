use async_trait::async_trait;
use google_calendar3::api::{Event, EventDateTime};
use google_calendar3::common::NoToken;
use google_calendar3::hyper_rustls::HttpsConnector;
use google_calendar3::CalendarHub;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use shared_types::{CalendarEvent, EventListRequest};

use crate::config::Credentials;
use crate::error::SourceError;
use crate::source::EventSource;

const UNTITLED: &str = "(no title)";

/// Reads events from a publicly readable Google calendar using an API key.
///
/// Public calendars need no OAuth flow; the key is passed as the `key`
/// query parameter on every request.
pub struct GoogleCalendarSource {
    hub: CalendarHub<HttpsConnector<HttpConnector>>,
    api_key: String,
}

impl GoogleCalendarSource {
    pub fn new(credentials: &Credentials) -> Result<Self, SourceError> {
        let connector = google_calendar3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| SourceError::Build(format!("failed to load native TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = CalendarHub::new(client, NoToken);

        Ok(Self {
            hub,
            api_key: credentials.api_key.clone(),
        })
    }
}

#[async_trait]
impl EventSource for GoogleCalendarSource {
    async fn list(&self, request: &EventListRequest) -> Result<Vec<CalendarEvent>, SourceError> {
        let max_results = i32::try_from(request.max_results).unwrap_or(i32::MAX);

        let (_, events) = self
            .hub
            .events()
            .list(&request.calendar_id)
            .time_min(request.time_min)
            .time_max(request.time_max)
            .max_results(max_results)
            .single_events(request.single_events)
            .order_by(&request.order_by)
            .param("key", self.api_key.as_str())
            .doit()
            .await
            .map_err(|e| SourceError::request(e.to_string()))?;

        Ok(events
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(convert_event)
            .collect())
    }
}

/// Convert an API event; all-day events (date only, no `dateTime`) are skipped
fn convert_event(event: Event) -> Option<CalendarEvent> {
    let summary = event
        .summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let start = event.start.as_ref().and_then(date_time);
    let end = event.end.as_ref().and_then(date_time);

    match (start, end) {
        (Some(start), Some(end)) => Some(CalendarEvent::new(summary, start, end)),
        _ => {
            tracing::debug!("Skipping event without start/end time: {}", summary);
            None
        }
    }
}

fn date_time(value: &EventDateTime) -> Option<chrono::DateTime<chrono::Utc>> {
    value.date_time
}
