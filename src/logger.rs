use crate::context::{LogContext, RequestHandle};
use crate::entry::{ErrorValue, LogEntry};
use crate::manager::DispatchManager;
use crate::scope::SubmissionContext;
use crate::severity::Severity;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Separator used when displaying a logger's name path.
pub const NAME_SEPARATOR: &str = ".";

/// Target of the `tracing` events emitted by [`Logger`]; the
/// [`TelemetryLayer`](crate::layer::TelemetryLayer) skips it so entries are
/// not dispatched twice.
pub const LOCAL_TARGET: &str = "telemetry_bridge::logger";

/// Path-like logger name, e.g. `api.orders`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoggerIdentity {
    segments: Arc<[String]>,
}

impl LoggerIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self::from_segments([name])
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// This identity with `name` appended; `self` is unchanged.
    pub fn extend(&self, name: impl Into<String>) -> Self {
        Self::from_segments(self.segments.iter().cloned().chain([name.into()]))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(String::is_empty)
    }

    pub fn display_name(&self) -> String {
        self.segments.join(NAME_SEPARATOR)
    }
}

impl Default for LoggerIdentity {
    fn default() -> Self {
        Self {
            segments: Arc::from(Vec::new()),
        }
    }
}

impl fmt::Display for LoggerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Named, context-carrying logger.
///
/// Every `extend`/`with_*` call returns a new logger and leaves the
/// receiver untouched. Entries at or above the logger's threshold are
/// written to the local `tracing` subscriber and, when a
/// [`DispatchManager`] is attached, handed to it.
#[derive(Clone)]
pub struct Logger {
    identity: LoggerIdentity,
    name: Arc<str>,
    level: Severity,
    manager: Option<DispatchManager>,
    context: LogContext,
    fields: BTreeMap<String, serde_json::Value>,
    error: Option<ErrorValue>,
    enabled: bool,
}

impl Logger {
    /// Logger without a dispatch manager.
    pub fn plain(name: impl Into<String>, level: Severity) -> Self {
        Self::build(LoggerIdentity::new(name), level, None)
    }

    /// Logger that discards everything.
    pub fn nop() -> Self {
        let mut logger = Self::build(LoggerIdentity::default(), Severity::Panic, None);
        logger.enabled = false;
        logger
    }

    pub fn with_manager(identity: LoggerIdentity, level: Severity, manager: DispatchManager) -> Self {
        Self::build(identity, level, Some(manager))
    }

    fn build(identity: LoggerIdentity, level: Severity, manager: Option<DispatchManager>) -> Self {
        Self {
            name: Arc::from(identity.display_name()),
            identity,
            level,
            manager,
            context: LogContext::default(),
            fields: BTreeMap::new(),
            error: None,
            enabled: true,
        }
    }

    /// Child logger whose name path ends with `name`. It keeps the
    /// manager, threshold and context of `self`.
    pub fn extend(&self, name: impl Into<String>) -> Self {
        let identity = self.identity.extend(name);
        Self {
            name: Arc::from(identity.display_name()),
            identity,
            ..self.clone()
        }
    }

    pub fn with_user(&self, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let mut logger = self.with_context(self.context.with_user(user_id.clone()));
        logger
            .fields
            .insert("user_id".to_string(), serde_json::Value::String(user_id));
        logger
    }

    pub fn with_request(&self, request: &RequestHandle) -> Self {
        self.with_context(self.context.with_request(request.clone()))
    }

    pub fn with_submission_context(&self, submission: &SubmissionContext) -> Self {
        self.with_context(self.context.with_submission(submission.clone()))
    }

    pub fn with_field(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let mut logger = self.clone();
        logger.fields.insert(key.into(), value.into());
        logger
    }

    pub fn with_fields<I, K, V>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        let mut logger = self.clone();
        logger
            .fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        logger
    }

    pub fn with_error(&self, error: ErrorValue) -> Self {
        Self {
            error: Some(error),
            ..self.clone()
        }
    }

    fn with_context(&self, context: LogContext) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }

    pub fn identity(&self) -> &LoggerIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Severity {
        self.level
    }

    pub fn manager(&self) -> Option<&DispatchManager> {
        self.manager.as_ref()
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn is_enabled(&self, level: Severity) -> bool {
        self.enabled && level >= self.level
    }

    /// Log `message` at `level`.
    pub fn log(&self, level: Severity, message: impl Into<String>) {
        if !self.is_enabled(level) {
            return;
        }

        let entry = self.entry(level, message.into());
        emit_local(&entry);
        if let Some(manager) = &self.manager {
            manager.fire(&entry);
        }
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(Severity::Trace, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Severity::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    fn entry(&self, level: Severity, message: String) -> LogEntry {
        LogEntry {
            level,
            message,
            timestamp: chrono::Utc::now(),
            fields: self.fields.clone(),
            error: self.error.clone(),
            logger_name: (!self.name.is_empty()).then(|| self.name.to_string()),
            context: self.context.clone(),
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("managed", &self.manager.is_some())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Write `entry` to the local `tracing` subscriber.
fn emit_local(entry: &LogEntry) {
    macro_rules! local_event {
        ($level:expr) => {
            tracing::event!(
                target: LOCAL_TARGET,
                $level,
                logger = entry.logger_name().unwrap_or_default(),
                user_id = entry.context.user_id(),
                fields = %FieldsDisplay(&entry.fields),
                error = entry.error.as_ref().map(tracing::field::display),
                "{}",
                entry.message
            )
        };
    }

    match entry.level {
        Severity::Trace => local_event!(tracing::Level::TRACE),
        Severity::Debug => local_event!(tracing::Level::DEBUG),
        Severity::Info => local_event!(tracing::Level::INFO),
        Severity::Warn => local_event!(tracing::Level::WARN),
        Severity::Error | Severity::Fatal | Severity::Panic => local_event!(tracing::Level::ERROR),
    }
}

struct FieldsDisplay<'a>(&'a BTreeMap<String, serde_json::Value>);

impl fmt::Display for FieldsDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("{}"),
        }
    }
}
