//! Panic recovery for axum services.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/orders/{id}", get(show_order))
//!     .route_layer(middleware::from_fn_with_state(logger.clone(), recover_panics));
//! ```
//!
//! Added with `route_layer`, the middleware sees the matched route pattern
//! and entries logged during the request are grouped by it. Handlers can
//! bind their own logs to the request through the [`RequestHandle`]
//! extension:
//!
//! ```ignore
//! async fn show_order(Extension(request): Extension<RequestHandle>) {
//!     logger.with_request(&request).error("not found");
//! }
//! ```

use crate::context::{RequestHandle, RequestMetadata};
use crate::logger::Logger;
use crate::manager::panic_message;
use crate::scope::{BaseConfig, SubmissionContext};
use axum::body::Body;
use axum::extract::{MatchedPath, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Status used when the client is gone; nothing reaches it anyway.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// How a request passing through [`recover_panics`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed,
    PanicCaught,
}

/// What a caught panic was about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanicKind {
    /// The client connection broke; no response can be written.
    BrokenConnection,
    /// Any other failure, with the panic message.
    Application(String),
}

/// Classify a panic payload.
pub fn classify_panic(payload: &(dyn Any + Send)) -> PanicKind {
    if let Some(err) = payload.downcast_ref::<io::Error>() {
        if matches!(err.kind(), io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset) {
            return PanicKind::BrokenConnection;
        }
    }

    let message = panic_message(payload);
    let lower = message.to_ascii_lowercase();
    if lower.contains("broken pipe") || lower.contains("connection reset by peer") {
        PanicKind::BrokenConnection
    } else {
        PanicKind::Application(message)
    }
}

/// Capture the request metadata the pipeline needs.
pub fn request_metadata(req: &Request<Body>) -> RequestMetadata {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    req.headers().iter().fold(
        RequestMetadata::new(req.method().as_str(), route).with_url(req.uri().to_string()),
        |meta, (name, value)| match value.to_str() {
            Ok(value) => meta.with_header(name.as_str(), value),
            Err(_) => meta,
        },
    )
}

/// axum middleware catching panics raised while handling a request.
///
/// A broken connection is aborted silently; any other panic is logged at
/// error severity through `logger` bound to the request and answered with
/// `500 Internal Server Error`.
pub async fn recover_panics(State(logger): State<Logger>, mut req: Request<Body>, next: Next) -> Response {
    let metadata = request_metadata(&req);
    let submission = match logger.manager() {
        Some(manager) => manager.new_request_context(&metadata),
        None => SubmissionContext::new(Arc::new(BaseConfig::default())),
    };
    let request = RequestHandle::new(metadata).with_submission(submission);
    req.extensions_mut().insert(request.clone());

    let (outcome, response) = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => (RequestOutcome::Completed, response),
        Err(payload) => {
            let kind = classify_panic(payload.as_ref());
            (RequestOutcome::PanicCaught, handle_panic(&logger, &request, kind))
        }
    };
    tracing::trace!(target: "telemetry_bridge::recovery", ?outcome, route = request.route(), "request finished");
    response
}

fn handle_panic(logger: &Logger, request: &RequestHandle, kind: PanicKind) -> Response {
    match kind {
        PanicKind::BrokenConnection => {
            let status = StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST);
            (status, Body::empty()).into_response()
        }
        PanicKind::Application(message) => {
            logger
                .with_request(request)
                .with_field("panic", message)
                .error(format!("recovered from panic in {:?}", request.route()));
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_broken_pipe_is_broken_connection() {
        let payload: Box<dyn Any + Send> = Box::new(io::Error::from(io::ErrorKind::BrokenPipe));
        assert_eq!(classify_panic(payload.as_ref()), PanicKind::BrokenConnection);

        let payload: Box<dyn Any + Send> = Box::new(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(classify_panic(payload.as_ref()), PanicKind::BrokenConnection);
    }

    #[test]
    fn broken_pipe_message_is_broken_connection() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("write failed: Broken pipe (os error 32)"));
        assert_eq!(classify_panic(payload.as_ref()), PanicKind::BrokenConnection);
    }

    #[test]
    fn other_panics_are_application_failures() {
        let payload: Box<dyn Any + Send> = Box::new("called `Option::unwrap()` on a `None` value");
        assert_eq!(
            classify_panic(payload.as_ref()),
            PanicKind::Application("called `Option::unwrap()` on a `None` value".to_string())
        );

        let payload: Box<dyn Any + Send> = Box::new(io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(classify_panic(payload.as_ref()), PanicKind::Application(_)));
    }

    #[test]
    fn metadata_falls_back_to_uri_path() {
        let req = Request::builder()
            .method("DELETE")
            .uri("/orders/9?force=1")
            .header("x-request-id", "abc")
            .header("authorization", "Bearer t")
            .body(Body::empty())
            .unwrap();

        let meta = request_metadata(&req);
        assert_eq!(meta.method, "DELETE");
        assert_eq!(meta.route, "/orders/9");
        assert_eq!(meta.url, "/orders/9?force=1");
        assert_eq!(meta.headers.len(), 1);
    }
}
