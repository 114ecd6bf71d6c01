//! Shared wiring for instrumented binaries: env configuration, service
//! identity, tracing/OTLP initialization, and the metrics exporter.

pub mod from_env;

pub mod identity;

pub mod metrics;

pub mod otlp;

pub mod tracing;
