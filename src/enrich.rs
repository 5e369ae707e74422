//! Turns a [`LogEntry`] into a [`TelemetryEvent`].
//!
//! Enrichment never fails: any piece of context missing from the entry just
//! leaves the matching part of the event empty.

use crate::entry::{ErrorValue, LogEntry};
use crate::event::{Breadcrumb, TelemetryEvent, User};
use crate::scope::SubmissionContext;
use crate::severity::Severity;
use std::collections::BTreeMap;

/// First element of every fingerprint produced by this crate.
pub const FINGERPRINT_BASE: &str = "api";

/// Build the event for `entry`, recording its breadcrumbs on `scope`.
pub fn enrich(entry: &LogEntry, scope: &SubmissionContext) -> TelemetryEvent {
    let mut event = TelemetryEvent::new(entry.level, entry.message.clone(), entry.timestamp);
    event.extra = entry.fields.clone();
    event.logger = entry.logger_name.clone();
    event.fingerprint = fingerprint(entry);

    if let Some(error) = &entry.error {
        add_error_breadcrumbs(scope, entry, error);
    }

    if let Some(user_id) = entry.context.user_id() {
        event.user = Some(User {
            id: user_id.to_string(),
        });
    }

    let base = scope.base();
    event.tags = base.tags.clone();
    event
        .tags
        .extend(scope.tags().iter().map(|(k, v)| (k.clone(), v.clone())));
    event.environment = base.environment.clone();
    event.release = base.release.clone();
    event.request = scope
        .request()
        .cloned()
        .or_else(|| entry.context.request().map(|r| r.metadata().clone()));
    event.breadcrumbs = scope.breadcrumbs();

    event
}

/// Deterministic grouping key for `entry`.
///
/// A bound request wins outright: the route identifies the failure better
/// than the component that happened to log it.
pub fn fingerprint(entry: &LogEntry) -> Vec<String> {
    if let Some(request) = entry.context.request() {
        vec![
            FINGERPRINT_BASE.to_string(),
            request.method().to_string(),
            request.route().to_string(),
            entry.message.clone(),
        ]
    } else if let Some(name) = entry.logger_name() {
        vec![
            FINGERPRINT_BASE.to_string(),
            name.to_string(),
            entry.message.clone(),
        ]
    } else {
        Vec::new()
    }
}

fn add_error_breadcrumbs(scope: &SubmissionContext, entry: &LogEntry, error: &ErrorValue) {
    if let Some(query) = error.query() {
        let mut data = BTreeMap::new();
        data.insert("query".to_string(), serde_json::Value::String(query.query_body()));
        data.insert(
            "args".to_string(),
            serde_json::Value::Array(query.query_arguments()),
        );
        scope.add_breadcrumb(
            Breadcrumb::new("query", "db", "database query", Severity::Info)
                .with_data(data)
                .at(entry.timestamp),
        );
    }

    scope.add_breadcrumb(
        Breadcrumb::new(
            "error",
            entry.logger_name().unwrap_or_default(),
            error.to_string(),
            Severity::Error,
        )
        .at(entry.timestamp),
    );
}
