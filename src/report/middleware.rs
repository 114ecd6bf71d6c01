//! Middleware that reports unhandled handler failures to the telemetry sink.

use crate::report::{
    event::{ErrorDetail, ErrorEvent, RequestMeta},
    reporter::Reporter,
};
use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use std::{future::Future, panic::AssertUnwindSafe, pin::Pin};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// A [`Layer`] that wraps request dispatch with error capture.
///
/// The wrapped service observes every request's outcome. A panicking handler
/// yields one [`ErrorEvent`] and a generic 500 response; a 500-class
/// response from the handler yields one event built from its
/// [`ErrorDetail`] extension when present, or the status line otherwise.
/// Telemetry submission is fire-and-forget through the [`Reporter`] and
/// never delays or alters the response.
///
/// Install this once, as the outermost layer of the router, so that each
/// failure is reported exactly once.
#[derive(Debug, Clone)]
pub struct ErrorReportLayer {
    reporter: Reporter,
}

impl ErrorReportLayer {
    /// Create a new `ErrorReportLayer` reporting through the given handle.
    pub const fn new(reporter: Reporter) -> Self {
        Self { reporter }
    }
}

impl<S> Layer<S> for ErrorReportLayer {
    type Service = ErrorReportService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorReportService {
            inner,
            reporter: self.reporter.clone(),
        }
    }
}

/// A service that captures failures from its inner service and reports them.
/// Meant to be nestable and cheaply cloneable.
///
/// Also opens an OTEL-conformant server span per request, with the remote
/// parent extracted from the inbound headers.
#[derive(Debug, Clone)]
pub struct ErrorReportService<S> {
    inner: S,
    reporter: Reporter,
}

impl<S> ErrorReportService<S> {
    /// Create a new `ErrorReportService` with the given inner service and
    /// reporter handle.
    pub const fn new(inner: S, reporter: Reporter) -> Self {
        Self { inner, reporter }
    }

    /// Record the outcome on the request span, and report the response if it
    /// indicates a server error.
    fn observe(&self, response: Response, meta: RequestMeta) -> Response {
        tracing::Span::current().record("http.response.status_code", response.status().as_u16());

        if response.status().is_server_error() {
            let event = match response.extensions().get::<ErrorDetail>() {
                Some(detail) => ErrorEvent::with_detail(detail, meta),
                None => ErrorEvent::from_status(response.status(), meta),
            };
            self.reporter.report(event);
        }

        response
    }
}

impl<S> Service<Request> for ErrorReportService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let mut this = self.clone();

        let parent_context = opentelemetry::global::get_text_map_propagator(|propagator| {
            propagator.extract(&opentelemetry_http::HeaderExtractor(req.headers()))
        });

        let meta = RequestMeta::of(&req);
        let name = format!("{} {}", meta.method(), meta.route());

        let span = info_span!(
            "Http Request",
            "otel.name" = name.as_str(),
            "otel.kind" = "server",
            "http.request.method" = meta.method(),
            "url.path" = meta.path(),
            "http.route" = meta.route(),
            "http.response.status_code" = tracing::field::Empty,
        );
        span.set_parent(parent_context);

        Box::pin(
            async move {
                match AssertUnwindSafe(this.inner.call(req)).catch_unwind().await {
                    Ok(Ok(response)) => Ok(this.observe(response, meta)),
                    Ok(Err(err)) => Err(err),
                    Err(payload) => {
                        // capture first, then produce the framework's
                        // generic error response
                        this.reporter
                            .report(ErrorEvent::from_panic(payload.as_ref(), meta));

                        let response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
                        tracing::Span::current()
                            .record("http.response.status_code", response.status().as_u16());
                        Ok(response)
                    }
                }
            }
            .instrument(span),
        )
    }
}
