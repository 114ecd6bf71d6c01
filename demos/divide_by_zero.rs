//! Minimal wiring demo: an axum app with one route that always fails, with
//! the error-report middleware attached. Every request to `GET /` produces
//! an HTTP 500 and one error event at the telemetry backend.
//!
//! ## Observing the reported errors
//!
//! We recommend the following:
//! - set `RUST_LOG=info` to see log lines
//! - use [otel-desktop-viewer](https://github.com/CtrlSpice/otel-desktop-viewer)
//!
//! ## Running this example
//!
//! ```no_compile
//! export OTEL_EXPORTER_OTLP_ENDPOINT="http://localhost:4318"
//! export OTEL_EXPORTER_OTLP_PROTOCOL="http/protobuf"
//! export RUST_LOG=info
//! cargo run --example divide_by_zero
//! ```
//!
//! ```no_compile
//! curl -i http://localhost:8000/
//! ```
use axum::{routing::get, Json, Router};
use errlight::{errlight_as, utils::identity::ServiceIdentity};
use serde::Serialize;

#[derive(Serialize)]
struct Greeting {
    hello: &'static str,
}

async fn read_root() -> Json<Greeting> {
    // deliberate fault injection, so the middleware has something to report
    let denominator: u32 = "0".parse().unwrap();
    let _quotient = 1 / denominator;

    Json(Greeting { hello: "world" })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    let instrumentation = errlight_as(ServiceIdentity::new("11983", "my-app", "git-sha"));

    let app = Router::new()
        .route("/", get(read_root))
        .layer(instrumentation.layer());

    let listener = tokio::net::TcpListener::bind("localhost:8000").await?;
    tracing::info!("listening on http://localhost:8000");
    axum::serve(listener, app).await?;
    Ok(())
}
