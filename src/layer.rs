use crate::entry::{ErrorValue, LogEntry};
use crate::manager::DispatchManager;
use crate::severity::Severity;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Target prefix of every event this crate emits.
const CRATE_TARGET: &str = "telemetry_bridge";

/// `tracing_subscriber` layer that turns plain `tracing` events into
/// [`LogEntry`]s and hands them to a [`DispatchManager`].
///
/// Only events whose severity the manager forwards are converted. The
/// event target becomes the logger name, so grouping works the same way as
/// for entries logged through a [`Logger`](crate::logger::Logger). Events
/// emitted by `Logger` itself and the crate's own diagnostics are skipped;
/// the logger already fired them.
pub struct TelemetryLayer {
    manager: DispatchManager,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events handed to the manager.
    pub forwarded_events: Arc<AtomicU64>,
}

impl TelemetryLayer {
    pub fn new(manager: DispatchManager) -> Self {
        Self {
            manager,
            total_events: Arc::new(AtomicU64::new(0)),
            forwarded_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<S> Layer<S> for TelemetryLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if is_own_target(meta.target()) {
            return;
        }
        let level = Severity::from_tracing(meta.level());
        if !self.manager.qualifies(level) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut error: Option<ErrorValue> = None;

        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
            error: &mut error,
        };
        event.record(&mut visitor);

        let entry = LogEntry {
            level,
            message: message.unwrap_or_default(),
            timestamp: Utc::now(),
            fields,
            error,
            logger_name: Some(meta.target().to_string()),
            context: Default::default(),
        };

        self.forwarded_events.fetch_add(1, Ordering::Relaxed);
        self.manager.fire(&entry);
    }
}

/// Whether `target` is this crate or one of its modules.
fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(CRATE_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, serde_json::Value>,
    pub message: &'a mut Option<String>,
    pub error: &'a mut Option<ErrorValue>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let text = value.to_string();
        self.fields.insert(field.name().to_string(), serde_json::Value::String(text.clone()));
        *self.error = Some(ErrorValue::msg(text));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
