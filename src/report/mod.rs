//! Error-event capture and delivery: the data model, the sink abstraction,
//! the fire-and-forget reporter, and the axum middleware that ties them to
//! request dispatch.

pub mod event;
pub use event::{internal_error, ErrorDetail, ErrorEvent, RequestMeta};

pub mod middleware;
pub use middleware::{ErrorReportLayer, ErrorReportService};

pub mod reporter;
pub use reporter::{Reporter, ReporterConfig};

pub mod sink;
pub use sink::{EventSink, NoopSink, OtlpSink, SinkError};
