use crate::event::TelemetryEvent;
use crate::sink::TelemetrySink;
use async_trait::async_trait;
use std::error::Error;

/// A sink that simply drops all events.
///
/// Used when no DSN is configured, and handy for measuring the overhead of
/// the pipeline itself without any network I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl TelemetrySink for NoopSink {
    async fn send(&self, _event: &TelemetryEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
