use async_trait::async_trait;
use calendar_notifier::service::{self, NotifierService};
use calendar_notifier::{
    ActionSink, Clock, EventSource, GuardPolicy, MonotonicClock, NotifierConfig, NotifierError,
    SourceError,
};
use chrono::{DateTime, TimeZone, Utc};
use shared_types::{ActionKind, CalendarEvent, EventListRequest};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

type QueryResult = Result<Vec<CalendarEvent>, SourceError>;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn at_secs(secs: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(secs)
}

/// Replays scripted results in order, then returns empty lists
struct ScriptedSource {
    script: Mutex<VecDeque<QueryResult>>,
    requests: Mutex<Vec<EventListRequest>>,
}

impl ScriptedSource {
    fn new(script: Vec<QueryResult>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<EventListRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn list(&self, request: &EventListRequest) -> QueryResult {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Records each fired message with the clock reading at fire time
struct RecordingSink {
    clock: Arc<MonotonicClock>,
    fired: Mutex<Vec<(DateTime<Utc>, String)>>,
}

impl RecordingSink {
    fn new(clock: Arc<MonotonicClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            fired: Mutex::new(Vec::new()),
        })
    }

    fn fired(&self) -> Vec<(DateTime<Utc>, String)> {
        self.fired.lock().unwrap().clone()
    }
}

impl ActionSink for RecordingSink {
    fn fire(&self, message: &str) {
        let now = self.clock.now();
        self.fired.lock().unwrap().push((now, message.to_string()));
    }
}

/// How the first query misbehaves before the source recovers
#[derive(Clone, Copy)]
enum FirstCall {
    Hang,
    Panic,
}

struct UnreliableSource {
    first: FirstCall,
    calls: AtomicUsize,
}

impl UnreliableSource {
    fn new(first: FirstCall) -> Arc<Self> {
        Arc::new(Self {
            first,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for UnreliableSource {
    async fn list(&self, _request: &EventListRequest) -> QueryResult {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            match self.first {
                FirstCall::Hang => std::future::pending::<()>().await,
                FirstCall::Panic => panic!("calendar client blew up"),
            }
        }
        Ok(Vec::new())
    }
}

fn start_with_source(
    config: NotifierConfig,
    source: Arc<dyn EventSource>,
) -> (oneshot::Sender<()>, JoinHandle<Result<(), NotifierError>>) {
    let clock = Arc::new(MonotonicClock::new(t0()));
    let sink = RecordingSink::new(Arc::clone(&clock));
    let (shutdown, shutdown_rx) = oneshot::channel();

    let service = NotifierService::new(config, "team@example.com", source, sink, clock);
    let handle = tokio::spawn(service.run_until(async {
        shutdown_rx.await.ok();
    }));
    (shutdown, handle)
}

struct Harness {
    source: Arc<ScriptedSource>,
    sink: Arc<RecordingSink>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), NotifierError>>,
}

fn start(config: NotifierConfig, script: Vec<QueryResult>) -> Harness {
    let clock = Arc::new(MonotonicClock::new(t0()));
    let source = ScriptedSource::new(script);
    let sink = RecordingSink::new(Arc::clone(&clock));
    let (shutdown, shutdown_rx) = oneshot::channel();

    let service = NotifierService::new(
        config,
        "team@example.com",
        source.clone(),
        sink.clone(),
        clock,
    );
    let handle = tokio::spawn(service.run_until(async {
        shutdown_rx.await.ok();
    }));

    Harness {
        source,
        sink,
        shutdown,
        handle,
    }
}

async fn stop(harness: Harness) {
    harness.shutdown.send(()).ok();
    let result = harness.handle.await.unwrap();
    assert_ok!(result);
}

fn assert_near(actual: DateTime<Utc>, expected: DateTime<Utc>) {
    let drift = (actual - expected).num_milliseconds().abs();
    assert!(
        drift <= 50,
        "expected {} but got {} ({} ms off)",
        expected,
        actual,
        drift
    );
}

fn failure() -> QueryResult {
    Err(SourceError::request("503 Service Unavailable"))
}

#[tokio::test(start_paused = true)]
async fn test_first_plan_queries_window_immediately() {
    let harness = start(NotifierConfig::default(), vec![]);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let requests = harness.source.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].calendar_id, "team@example.com");
    assert_eq!(requests[0].max_results, 10);
    assert!(requests[0].single_events);
    assert_eq!(requests[0].order_by, "startTime");
    assert_near(requests[0].time_min, at_secs(10));
    assert_eq!(
        requests[0].time_max - requests[0].time_min,
        chrono::Duration::seconds(31 * 60)
    );

    stop(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_event_inside_window_fires_start_and_end() {
    let events = vec![CalendarEvent::new("Standup", at_secs(300), at_secs(900))];
    let harness = start(NotifierConfig::default(), vec![Ok(events)]);

    tokio::time::sleep(Duration::from_secs(20 * 60)).await;

    let fired = harness.sink.fired();
    assert_eq!(fired.len(), 2);
    assert_eq!(fired[0].1, ActionKind::Start.message("Standup"));
    assert_near(fired[0].0, at_secs(300));
    assert_eq!(fired[1].1, ActionKind::End.message("Standup"));
    assert_near(fired[1].0, at_secs(900));

    stop(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_started_event_fires_only_end() {
    let events = vec![CalendarEvent::new("Review", at_secs(-300), at_secs(600))];
    let harness = start(NotifierConfig::default(), vec![Ok(events)]);

    tokio::time::sleep(Duration::from_secs(15 * 60)).await;

    let fired = harness.sink.fired();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].1, "Event Named: Review ends");

    stop(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_failures_retry_at_fixed_delay() {
    let script = vec![failure(), failure(), failure(), Ok(vec![])];
    let harness = start(NotifierConfig::default(), script);

    tokio::time::sleep(Duration::from_secs(3 * 60 + 30)).await;

    let requests = harness.source.requests();
    assert_eq!(requests.len(), 4);
    for pair in requests.windows(2) {
        assert_near(
            pair[1].time_min,
            pair[0].time_min + chrono::Duration::seconds(60),
        );
    }

    stop(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_cycle_stops_retrying_until_next_period() {
    let config = NotifierConfig {
        max_errors: 3,
        ..Default::default()
    };
    let harness = start(config, (0..10).map(|_| failure()).collect());

    // Failures at 0s, 60s, 120s; the third abandons the cycle
    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    assert_eq!(harness.source.requests().len(), 3);

    // Next periodic tick fails once and abandons straight away: the counter
    // was left at the bound
    tokio::time::sleep(Duration::from_secs(25 * 60)).await;
    let requests = harness.source.requests();
    assert_eq!(requests.len(), 4);
    assert_near(requests[3].time_min, at_secs(30 * 60 + 10));

    stop(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_pending_actions_defer_and_replan_after_release() {
    let config = NotifierConfig {
        poll_interval_secs: 300,
        ..Default::default()
    };
    // Window is [10s, 370s]
    let events = vec![CalendarEvent::new("Coffee", at_secs(20), at_secs(360))];
    let harness = start(config, vec![Ok(events)]);

    // Tick at 300s finds the end action pending until 360s and re-plans
    // just after it instead of querying at once or waiting for the 600s tick
    tokio::time::sleep(Duration::from_secs(450)).await;

    let requests = harness.source.requests();
    assert_eq!(requests.len(), 2);
    assert_near(
        requests[1].time_min,
        at_secs(360 + 10) + chrono::Duration::milliseconds(10),
    );

    let fired = harness.sink.fired();
    assert_eq!(fired.len(), 2);

    stop(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_last_write_wins_unblocks_on_first_release() {
    let config = NotifierConfig {
        poll_interval_secs: 300,
        guard_policy: GuardPolicy::LastWriteWins,
        ..Default::default()
    };
    // Marks at 20s, 350s, then 40s. The release at 20s clears the guard
    // although the end action at 350s is still armed.
    let events = vec![
        CalendarEvent::new("Retro", at_secs(20), at_secs(350)),
        CalendarEvent::new("Planning", at_secs(40), at_secs(2000)),
    ];
    let harness = start(config, vec![Ok(events)]);

    tokio::time::sleep(Duration::from_secs(310)).await;

    // The 300s tick queried straight away instead of deferring to 350s
    let requests = harness.source.requests();
    assert_eq!(requests.len(), 2);
    assert_near(requests[1].time_min, at_secs(310));

    stop(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_armed_actions() {
    let events = vec![CalendarEvent::new("Later", at_secs(600), at_secs(1200))];
    let harness = start(NotifierConfig::default(), vec![Ok(events)]);

    tokio::time::sleep(Duration::from_secs(60)).await;
    let sink = Arc::clone(&harness.sink);
    stop(harness).await;

    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    assert!(sink.fired().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_preview_reports_actions_per_event() {
    let clock = MonotonicClock::new(t0());
    let source = ScriptedSource::new(vec![Ok(vec![
        CalendarEvent::new("Standup", at_secs(300), at_secs(900)),
        CalendarEvent::new("Review", at_secs(-300), at_secs(600)),
        CalendarEvent::new("Offsite", at_secs(600), at_secs(7200)),
    ])]);

    let preview = assert_ok!(
        service::preview(
            &NotifierConfig::default(),
            "team@example.com",
            source.as_ref(),
            &clock
        )
        .await
    );

    assert_eq!(preview.window.start, at_secs(10));
    let actions: Vec<_> = preview.entries.iter().map(|e| e.actions.clone()).collect();
    assert_eq!(
        actions,
        vec![
            vec![ActionKind::Start, ActionKind::End],
            vec![ActionKind::End],
            vec![ActionKind::Start],
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_preview_surfaces_source_error() {
    let clock = MonotonicClock::new(t0());
    let source = ScriptedSource::new(vec![failure()]);

    let result = service::preview(
        &NotifierConfig::default(),
        "team@example.com",
        source.as_ref(),
        &clock,
    )
    .await;

    let err = assert_err!(result);
    assert!(matches!(err, NotifierError::Source(_)));
}

#[tokio::test(start_paused = true)]
async fn test_hung_query_times_out_and_planning_continues() {
    let source = UnreliableSource::new(FirstCall::Hang);
    let (shutdown, handle) = start_with_source(NotifierConfig::default(), source.clone());

    // The first query hangs until the 30s timeout, then retries 60s later
    tokio::time::sleep(Duration::from_secs(95)).await;
    assert_eq!(source.calls(), 2);

    // Periodic ticks are not coalesced away behind the hung query
    tokio::time::sleep(Duration::from_secs(2 * 30 * 60)).await;
    assert_eq!(source.calls(), 4);

    shutdown.send(()).ok();
    assert_ok!(handle.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_query_counts_as_failure() {
    let source = UnreliableSource::new(FirstCall::Panic);
    let (shutdown, handle) = start_with_source(NotifierConfig::default(), source.clone());

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(source.calls(), 2);

    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    assert_eq!(source.calls(), 3);

    shutdown.send(()).ok();
    assert_ok!(handle.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_rejected_before_planning() {
    let config = NotifierConfig {
        lead_time_secs: u64::MAX / 2,
        ..Default::default()
    };
    let harness = start(config, vec![]);

    let result = harness.handle.await.unwrap();
    let err = assert_err!(result);
    assert!(matches!(err, NotifierError::Config(_)));
    assert!(harness.source.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_preview_times_out_on_hung_source() {
    let clock = MonotonicClock::new(t0());
    let source = UnreliableSource::new(FirstCall::Hang);

    let result = service::preview(
        &NotifierConfig::default(),
        "team@example.com",
        source.as_ref(),
        &clock,
    )
    .await;

    let err = assert_err!(result);
    assert!(matches!(err, NotifierError::Source(SourceError::Request(_))));
}
