//! End-to-end tests for the error-report middleware, driving an axum router
//! with a mock sink in place of the OTLP backend.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use errlight::{
    report::{
        internal_error, ErrorEvent, ErrorReportLayer, EventSink, Reporter, ReporterConfig,
        SinkError,
    },
    utils::identity::ServiceIdentity,
};
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tower::ServiceExt;

#[derive(Debug, Default)]
struct RecordingSink {
    events: Mutex<Vec<ErrorEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<ErrorEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn submit(&self, event: ErrorEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Simulates an unreachable telemetry endpoint.
#[derive(Debug)]
struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn submit(&self, _event: ErrorEvent) -> Result<(), SinkError> {
        Err(SinkError::Transport("connection refused".into()))
    }
}

/// Simulates a hung telemetry endpoint.
#[derive(Debug)]
struct StalledSink;

#[async_trait]
impl EventSink for StalledSink {
    async fn submit(&self, _event: ErrorEvent) -> Result<(), SinkError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

fn identity() -> ServiceIdentity {
    ServiceIdentity::new("11983", "my-app", "git-sha")
}

fn reporter(sink: Arc<dyn EventSink>) -> Reporter {
    Reporter::spawn(identity(), sink, ReporterConfig::default())
}

async fn read_root() -> &'static str {
    // same fault as the demo binary: a runtime division by zero
    let denominator: u32 = "0".parse().unwrap();
    let _quotient = 1 / denominator;
    "unreachable"
}

async fn ok() -> &'static str {
    "ok"
}

async fn mapped_failure() -> Response {
    let err = "nope".parse::<u32>().unwrap_err();
    internal_error(&err)
}

fn app(reporter: Reporter) -> Router {
    Router::new()
        .route("/", get(read_root))
        .route("/ok", get(ok))
        .route("/mapped", get(mapped_failure))
        .layer(ErrorReportLayer::new(reporter))
}

fn get_req(path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

async fn wait_for_events(sink: &RecordingSink, n: usize) -> Vec<ErrorEvent> {
    for _ in 0..200 {
        let events = sink.events();
        if events.len() >= n {
            return events;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    sink.events()
}

#[tokio::test]
async fn faulty_route_returns_500_and_reports_one_event() {
    let sink = Arc::new(RecordingSink::default());
    let app = app(reporter(sink.clone()));

    let response = app.oneshot(get_req("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let events = wait_for_events(&sink, 1).await;
    assert_eq!(events.len(), 1);

    let event = &events[0];
    assert_eq!(event.kind(), "panic");
    assert!(event.message().contains("divide by zero"));
    assert!(event.backtrace().is_some());
    assert_eq!(event.request().method(), "GET");
    assert_eq!(event.request().route(), "/");
    assert_eq!(event.service(), Some(&identity()));
}

#[tokio::test]
async fn repeated_requests_produce_independent_events() {
    let sink = Arc::new(RecordingSink::default());
    let app = app(reporter(sink.clone()));

    for _ in 0..3 {
        let response = app.clone().oneshot(get_req("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let events = wait_for_events(&sink, 3).await;
    assert_eq!(events.len(), 3);
    for event in &events {
        assert_eq!(event.kind(), "panic");
        assert_eq!(event.request().path(), "/");
    }
}

#[tokio::test]
async fn successful_route_reports_nothing() {
    let sink = Arc::new(RecordingSink::default());
    let app = app(reporter(sink.clone()));

    let response = app.oneshot(get_req("/ok")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn mapped_error_reports_detail() {
    let sink = Arc::new(RecordingSink::default());
    let app = app(reporter(sink.clone()));

    let response = app.oneshot(get_req("/mapped")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let events = wait_for_events(&sink, 1).await;
    assert_eq!(events.len(), 1);
    assert!(events[0].kind().contains("ParseIntError"));
    assert_eq!(
        events[0].message(),
        "nope".parse::<u32>().unwrap_err().to_string()
    );
}

#[tokio::test]
async fn failing_sink_does_not_affect_responses() {
    let app = app(reporter(Arc::new(FailingSink)));

    for _ in 0..2 {
        let response = app.clone().oneshot(get_req("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let response = app.oneshot(get_req("/ok")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn stalled_sink_does_not_delay_responses() {
    let app = app(reporter(Arc::new(StalledSink)));

    let started = Instant::now();
    for _ in 0..5 {
        let response = app.clone().oneshot(get_req("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // submissions queue behind a hung sink; responses must not
    assert!(started.elapsed() < Duration::from_secs(5));
}
