use crate::context::LogContext;
use crate::severity::Severity;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Optional capability of errors produced by database calls.
///
/// Errors implementing it get a `query` breadcrumb describing the statement
/// that failed, next to the regular error breadcrumb.
pub trait DescribesQuery: Send + Sync {
    fn query_body(&self) -> String;
    fn query_arguments(&self) -> Vec<serde_json::Value>;
}

/// Error attached to a log entry, together with its optional capabilities.
#[derive(Clone)]
pub struct ErrorValue {
    error: Arc<dyn Error + Send + Sync>,
    query: Option<Arc<dyn DescribesQuery>>,
}

impl ErrorValue {
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            error: Arc::new(error),
            query: None,
        }
    }

    /// Wrap an error that can also describe the query it came from.
    pub fn with_query<E>(error: E) -> Self
    where
        E: Error + DescribesQuery + Send + Sync + 'static,
    {
        let error = Arc::new(error);
        Self {
            query: Some(Arc::clone(&error) as Arc<dyn DescribesQuery>),
            error,
        }
    }

    /// Error built from a bare message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(MessageError(message.into()))
    }

    pub fn query(&self) -> Option<&dyn DescribesQuery> {
        self.query.as_deref()
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl fmt::Debug for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorValue")
            .field("error", &self.error)
            .field("query", &self.query.is_some())
            .finish()
    }
}

#[derive(thiserror::Error, Debug, Clone)]
#[error("{0}")]
pub struct MessageError(pub String);

/// One log call's payload, handed as is to the enrichment pipeline.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, serde_json::Value>,
    pub error: Option<ErrorValue>,
    pub logger_name: Option<String>,
    pub context: LogContext,
}

impl LogEntry {
    pub fn new(level: Severity, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            fields: BTreeMap::new(),
            error: None,
            logger_name: None,
            context: LogContext::default(),
        }
    }

    pub fn with_logger_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.logger_name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_error(mut self, error: ErrorValue) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_context(mut self, context: LogContext) -> Self {
        self.context = context;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn logger_name(&self) -> Option<&str> {
        self.logger_name.as_deref()
    }
}
