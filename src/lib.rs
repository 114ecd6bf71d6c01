//! Error-telemetry instrumentation for axum binaries.
//!
//! This crate wires the boring parts of an instrumented web service: a
//! tracing subscriber with optional OTLP export, an optional Prometheus
//! exporter, and a middleware that captures unhandled handler failures and
//! ships them to the telemetry backend without ever delaying the response.
//!
//! ## Usage
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use errlight::{errlight_as, utils::identity::ServiceIdentity};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let instrumentation = errlight_as(ServiceIdentity::new("11983", "my-app", "git-sha"));
//!
//!     let app = Router::new()
//!         .route("/", get(|| async { "hello" }))
//!         .layer(instrumentation.layer());
//!
//!     let listener = tokio::net::TcpListener::bind("localhost:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Env Reads
//!
//! - `ERRLIGHT_PROJECT_ID`, `ERRLIGHT_SERVICE_NAME`, `ERRLIGHT_SERVICE_VERSION` -
//!   service identity, see [`utils::identity::ServiceIdentity`].
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_LEVEL`, `OTEL_ENVIRONMENT_NAME` -
//!   OTLP export, see [`utils::otlp::OtelConfig`].
//! - `ERRLIGHT_QUEUE_CAPACITY`, `ERRLIGHT_SUBMIT_TIMEOUT_MS` - reporter
//!   bounds, see [`report::ReporterConfig`].
//! - `METRICS_PORT` - Prometheus exporter, see [`utils::metrics::MetricsConfig`].
//! - `RUST_LOG`, `RUST_OTEL_TRACE`, `TRACING_LOG_JSON` - log filtering and
//!   format, see [`utils::tracing::init_tracing`].

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![deny(unused_must_use, rust_2018_idioms)]

pub mod report;

pub mod utils;

/// Re-exports of common dependencies, for use in downstream binaries.
pub mod deps {
    pub use axum;
    pub use metrics;
    pub use tokio;
    pub use tower;
    pub use tracing;
}

use crate::{
    report::{ErrorReportLayer, EventSink, NoopSink, OtlpSink, Reporter, ReporterConfig},
    utils::{
        from_env::FromEnv, identity::ServiceIdentity, metrics::init_metrics, otlp::OtelGuard,
        tracing::init_tracing,
    },
};
use std::sync::Arc;

/// Process-wide instrumentation handle, created once at startup by
/// [`errlight`] or [`errlight_as`].
///
/// Holds the OTLP provider guard and the reporter, and hands out the
/// error-report middleware layer. Keep it alive for the lifetime of `main`;
/// dropping it flushes the OTLP exporter and drops its reporter handle. The
/// report queue closes once every [`Reporter`] handle is dropped, including
/// the clones held by installed middleware layers. Shutdown does not wait on
/// in-flight submissions.
#[derive(Debug)]
pub struct Instrumentation {
    identity: ServiceIdentity,
    reporter: Reporter,
    _otel: Option<OtelGuard>,
}

impl Instrumentation {
    /// The identity every error event is tagged with.
    pub const fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// A cheap-clone handle for submitting error events directly.
    pub fn reporter(&self) -> Reporter {
        self.reporter.clone()
    }

    /// The error-report middleware layer, for [`axum::Router::layer`].
    ///
    /// Install it once, outermost, so each failure is reported exactly once.
    pub fn layer(&self) -> ErrorReportLayer {
        ErrorReportLayer::new(self.reporter.clone())
    }
}

/// Initialize instrumentation with the service identity read from the
/// environment (falling back to placeholder values when unset).
///
/// See [`errlight_as`] for details.
pub fn errlight() -> Instrumentation {
    let identity = ServiceIdentity::from_env().unwrap_or_default();
    errlight_as(identity)
}

/// Initialize instrumentation for the given service identity.
///
/// Installs the tracing subscriber (fmt, plus OTLP export when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set), installs the Prometheus exporter
/// when `METRICS_PORT` is set, and spawns the background error reporter.
/// Without an OTLP endpoint, error events are logged and discarded.
///
/// Must be called within a tokio runtime, and at most once per process.
///
/// ## Panics
///
/// Panics if a global tracing subscriber has already been set, or if called
/// outside a tokio runtime.
pub fn errlight_as(identity: ServiceIdentity) -> Instrumentation {
    let otel = init_tracing(&identity);
    init_metrics();

    let sink: Arc<dyn EventSink> = match &otel {
        Some(guard) => Arc::new(OtlpSink::new(guard.error_tracer())),
        None => Arc::new(NoopSink),
    };

    let config = ReporterConfig::from_env().unwrap_or_default();
    let reporter = Reporter::spawn(identity.clone(), sink, config);

    Instrumentation {
        identity,
        reporter,
        _otel: otel,
    }
}
