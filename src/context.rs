use crate::scope::SubmissionContext;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Headers never copied into request metadata.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "proxy-authorization",
];

/// What the pipeline knows about an in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestMetadata {
    pub method: String,
    /// Matched route pattern, e.g. `/orders/{id}`.
    pub route: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl RequestMetadata {
    pub fn new(method: impl Into<String>, route: impl Into<String>) -> Self {
        let route = route.into();
        Self {
            method: method.into(),
            url: route.clone(),
            route,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Record a header unless it is in [`SENSITIVE_HEADERS`].
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        if !SENSITIVE_HEADERS.contains(&name.as_str()) {
            self.headers.insert(name, value.into());
        }
        self
    }
}

/// Handle to an in-flight request, carried by loggers bound to it.
///
/// Holds the request's stored [`SubmissionContext`] so that log calls made
/// while handling the request share one breadcrumb trail.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    metadata: Arc<RequestMetadata>,
    submission: Option<SubmissionContext>,
}

impl RequestHandle {
    pub fn new(metadata: RequestMetadata) -> Self {
        Self {
            metadata: Arc::new(metadata),
            submission: None,
        }
    }

    pub fn with_submission(mut self, submission: SubmissionContext) -> Self {
        self.submission = Some(submission);
        self
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    pub fn method(&self) -> &str {
        &self.metadata.method
    }

    pub fn route(&self) -> &str {
        &self.metadata.route
    }

    pub fn submission(&self) -> Option<&SubmissionContext> {
        self.submission.as_ref()
    }
}

/// Typed overlay of contextual values attached to log entries.
///
/// Every `with_*` method returns a new context; the receiver is left as is,
/// so a context can be shared freely between loggers and threads.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    user_id: Option<Arc<str>>,
    request: Option<RequestHandle>,
    submission: Option<SubmissionContext>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(&self, user_id: impl Into<String>) -> Self {
        let user_id: String = user_id.into();
        Self {
            user_id: Some(Arc::from(user_id)),
            ..self.clone()
        }
    }

    pub fn with_request(&self, request: RequestHandle) -> Self {
        Self {
            request: Some(request),
            ..self.clone()
        }
    }

    pub fn with_submission(&self, submission: SubmissionContext) -> Self {
        Self {
            submission: Some(submission),
            ..self.clone()
        }
    }

    /// Bound user id; an empty id counts as absent.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn request(&self) -> Option<&RequestHandle> {
        self.request.as_ref()
    }

    pub fn submission(&self) -> Option<&SubmissionContext> {
        self.submission.as_ref()
    }
}
