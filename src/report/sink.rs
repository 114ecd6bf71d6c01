use crate::report::event::ErrorEvent;
use async_trait::async_trait;
use core::fmt;
use opentelemetry::{
    trace::{Span, SpanKind, Status, Tracer},
    KeyValue,
};
use opentelemetry_semantic_conventions::attribute::{
    EXCEPTION_MESSAGE, EXCEPTION_STACKTRACE, EXCEPTION_TYPE, HTTP_REQUEST_METHOD, HTTP_ROUTE,
    URL_PATH,
};

/// Errors produced while submitting an event to the telemetry backend.
///
/// These are observed by the reporter worker, logged, and swallowed. They
/// never reach the request path.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The transport to the telemetry backend failed.
    #[error("telemetry transport error: {0}")]
    Transport(String),
}

/// A destination for [`ErrorEvent`]s.
///
/// Implementations must be best-effort: a failed submission is reported via
/// the returned error and otherwise has no effect on the process.
#[async_trait]
pub trait EventSink: fmt::Debug + Send + Sync + 'static {
    /// Submit one event to the backend.
    async fn submit(&self, event: ErrorEvent) -> Result<(), SinkError>;
}

/// Sink that records each event as an error-status span on the configured
/// OTLP provider, with an `exception` span event per the OTEL semantic
/// conventions.
///
/// Delivery is handled by the provider's batch exporter, so `submit` itself
/// does not touch the network.
#[derive(Debug, Clone)]
pub struct OtlpSink {
    tracer: opentelemetry_sdk::trace::Tracer,
}

impl OtlpSink {
    pub(crate) const fn new(tracer: opentelemetry_sdk::trace::Tracer) -> Self {
        Self { tracer }
    }
}

#[async_trait]
impl EventSink for OtlpSink {
    async fn submit(&self, event: ErrorEvent) -> Result<(), SinkError> {
        let mut span = self
            .tracer
            .span_builder("errlight.error")
            .with_kind(SpanKind::Internal)
            .with_attributes([
                KeyValue::new(HTTP_REQUEST_METHOD, event.request().method().to_string()),
                KeyValue::new(HTTP_ROUTE, event.request().route().to_string()),
                KeyValue::new(URL_PATH, event.request().path().to_string()),
            ])
            .start(&self.tracer);

        let mut attributes = vec![
            KeyValue::new(EXCEPTION_TYPE, event.kind().to_string()),
            KeyValue::new(EXCEPTION_MESSAGE, event.message().to_string()),
        ];
        if let Some(backtrace) = event.backtrace() {
            attributes.push(KeyValue::new(EXCEPTION_STACKTRACE, backtrace.to_string()));
        }

        span.add_event("exception", attributes);
        span.set_status(Status::error(event.message().to_string()));
        span.end();

        Ok(())
    }
}

/// Sink used when no OTLP endpoint is configured. Events are logged at debug
/// and discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn submit(&self, event: ErrorEvent) -> Result<(), SinkError> {
        tracing::debug!(
            kind = event.kind(),
            message = event.message(),
            route = event.request().route(),
            "no telemetry endpoint configured, discarding error event"
        );
        Ok(())
    }
}
