use crate::context::RequestMetadata;
use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Event submitted to the remote error-tracking service.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub event_id: Uuid,
    pub level: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub extra: BTreeMap<String, serde_json::Value>,
    /// Grouping key used by the remote service to deduplicate events.
    /// Empty means the service applies its own default grouping.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fingerprint: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestMetadata>,
}

impl TelemetryEvent {
    pub fn new(level: Severity, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            level,
            message: message.into(),
            timestamp,
            logger: None,
            extra: BTreeMap::new(),
            fingerprint: Vec::new(),
            user: None,
            breadcrumbs: Vec::new(),
            tags: BTreeMap::new(),
            environment: None,
            release: None,
            request: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
}

/// Ancillary diagnostic fact recorded ahead of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breadcrumb {
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, serde_json::Value>>,
    pub level: Severity,
    pub timestamp: DateTime<Utc>,
}

impl Breadcrumb {
    pub fn new(
        kind: impl Into<String>,
        category: impl Into<String>,
        message: impl Into<String>,
        level: Severity,
    ) -> Self {
        Self {
            kind: kind.into(),
            category: category.into(),
            message: message.into(),
            data: None,
            level,
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: BTreeMap<String, serde_json::Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
