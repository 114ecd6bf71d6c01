use crate::utils::identity::ServiceIdentity;
use axum::{
    extract::MatchedPath,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::{any::Any, backtrace::Backtrace, borrow::Cow, time::SystemTime};

/// Metadata about the request that was being processed when an error
/// occurred. Captured before the handler runs, so it is available even when
/// the handler panics.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RequestMeta {
    method: String,
    route: String,
    path: String,
}

impl RequestMeta {
    /// Capture metadata from an inbound request.
    ///
    /// The route is the matched path pattern when available (it is, for
    /// middleware installed via `Router::layer`), and the raw URI path
    /// otherwise.
    pub fn of<B>(req: &axum::http::Request<B>) -> Self {
        let path = req.uri().path().to_string();
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map(|r| r.as_str().to_string())
            .unwrap_or_else(|| path.clone());

        Self {
            method: req.method().to_string(),
            route,
            path,
        }
    }

    /// The HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The matched route pattern, e.g. `/users/{id}`.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// The raw URI path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A structured record of one handler failure, plus contextual metadata.
///
/// Constructed by the middleware at the point of failure, queued on the
/// reporter, sent to the sink, and then discarded. Nothing is persisted
/// locally.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorEvent {
    kind: Cow<'static, str>,
    message: String,
    backtrace: Option<String>,
    request: RequestMeta,
    service: Option<ServiceIdentity>,
    captured_at: SystemTime,
}

impl ErrorEvent {
    /// Create a new event with the given error kind and message.
    pub fn new(
        kind: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
        request: RequestMeta,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            backtrace: None,
            request,
            service: None,
            captured_at: SystemTime::now(),
        }
    }

    /// Create an event from a caught panic payload.
    ///
    /// The backtrace is captured at the catch site, after unwinding, so it
    /// points at the middleware rather than the panicking frame. Best-effort.
    pub fn from_panic(payload: &(dyn Any + Send), request: RequestMeta) -> Self {
        let mut event = Self::new("panic", panic_message(payload), request);
        event.backtrace = Some(Backtrace::force_capture().to_string());
        event
    }

    /// Create an event from a server-error response status, for handlers
    /// that map their own errors to responses without attaching an
    /// [`ErrorDetail`].
    pub fn from_status(status: StatusCode, request: RequestMeta) -> Self {
        Self::new("http", status.to_string(), request)
    }

    /// Create an event from an [`ErrorDetail`] response extension.
    pub fn with_detail(detail: &ErrorDetail, request: RequestMeta) -> Self {
        Self::new(detail.kind.clone(), detail.message.clone(), request)
    }

    /// Tag the event with the reporting service's identity.
    pub(crate) fn tagged(mut self, identity: &ServiceIdentity) -> Self {
        self.service = Some(identity.clone());
        self
    }

    /// The error kind, e.g. `panic` or an error type name.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Best-effort stack trace, if one was captured.
    pub fn backtrace(&self) -> Option<&str> {
        self.backtrace.as_deref()
    }

    /// Metadata of the originating request.
    pub fn request(&self) -> &RequestMeta {
        &self.request
    }

    /// Identity of the reporting service. Stamped by the reporter.
    pub fn service(&self) -> Option<&ServiceIdentity> {
        self.service.as_ref()
    }

    /// When the event was captured.
    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }
}

/// Response extension carrying a precise error type and message.
///
/// Handlers that map their own errors to 500-class responses can attach this
/// so the middleware reports the underlying error instead of the bare status
/// line. See [`internal_error`].
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    kind: Cow<'static, str>,
    message: String,
}

impl ErrorDetail {
    /// Create a new detail with the given error kind and message.
    pub fn new(kind: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a detail from an error, using its type name as the kind.
    pub fn of<E: std::error::Error>(err: &E) -> Self {
        Self::new(std::any::type_name::<E>(), err.to_string())
    }

    /// The error kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Map an error to a generic 500 response carrying an [`ErrorDetail`]
/// extension, so the error-report middleware can capture it. The error
/// itself is not exposed to the client.
pub fn internal_error<E: std::error::Error>(err: &E) -> Response {
    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    response.extensions_mut().insert(ErrorDetail::of(err));
    response
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use axum::{body::Body, http::Request};

    fn request() -> RequestMeta {
        let req = Request::builder()
            .method("GET")
            .uri("/users/42?verbose=1")
            .body(Body::empty())
            .unwrap();
        RequestMeta::of(&req)
    }

    #[test]
    fn meta_falls_back_to_uri_path() {
        let meta = request();
        assert_eq!(meta.method(), "GET");
        assert_eq!(meta.path(), "/users/42");
        // no MatchedPath extension outside a router
        assert_eq!(meta.route(), "/users/42");
    }

    #[test]
    fn panic_payload_messages() {
        let meta = request();

        let payload: Box<dyn Any + Send> = Box::new("boom");
        let event = ErrorEvent::from_panic(payload.as_ref(), meta.clone());
        assert_eq!(event.kind(), "panic");
        assert_eq!(event.message(), "boom");
        assert!(event.backtrace().is_some());

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        let event = ErrorEvent::from_panic(payload.as_ref(), meta);
        assert_eq!(event.message(), "opaque panic payload");
    }

    #[test]
    fn detail_uses_type_name() {
        let err = "nope".parse::<u32>().unwrap_err();
        let detail = ErrorDetail::of(&err);
        assert!(detail.kind().contains("ParseIntError"));
        assert_eq!(detail.message(), err.to_string());
    }

    #[test]
    fn internal_error_attaches_detail() {
        let err = "nope".parse::<u32>().unwrap_err();
        let response = internal_error(&err);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<ErrorDetail>().is_some());
    }
}
