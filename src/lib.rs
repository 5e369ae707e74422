//! Named, context-carrying loggers that forward qualifying entries to a
//! remote error-tracking service.
//!
//! A [`DispatchManager`](manager::DispatchManager) owns the transport and
//! issues [`Logger`](logger::Logger)s. Entries logged at a forwarded
//! severity are enriched into [`TelemetryEvent`](event::TelemetryEvent)s
//! with a deterministic fingerprint and a breadcrumb trail, then submitted
//! from a detached task so the logging call never waits on the network.

pub mod config;
pub mod context;
pub mod dsn;
pub mod enrich;
pub mod entry;
pub mod error;
pub mod event;
pub mod severity;
pub mod scope;
pub mod sink;
pub mod manager;
pub mod logger;
pub mod layer;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "axum")]
pub mod recovery;

pub mod init;
pub mod memory_sink;
pub mod noop_sink;

pub mod prelude {
    pub use crate::config::TelemetryConfig;
    pub use crate::context::{LogContext, RequestHandle, RequestMetadata};
    pub use crate::entry::{DescribesQuery, ErrorValue, LogEntry};
    pub use crate::event::{Breadcrumb, TelemetryEvent};
    pub use crate::logger::Logger;
    pub use crate::manager::{DispatchManager, LoggerMaker};
    pub use crate::scope::SubmissionContext;
    pub use crate::severity::Severity;
    pub use crate::sink::TelemetrySink;
}
