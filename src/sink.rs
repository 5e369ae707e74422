use crate::event::TelemetryEvent;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for [`TelemetryEvent`]s produced by the
/// dispatch pipeline.
///
/// Implementations are responsible for transporting events to a concrete
/// error-tracking service. The manager calls `send` from a detached task
/// and never awaits it on the application thread.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Send a single event to the underlying service.
    ///
    /// **Returns**
    /// - `Ok(())` if the event was accepted.
    /// - `Err(..)` if the transport failed (network error, serialization
    ///   error, HTTP status, etc.). The manager counts the failure and
    ///   drops the event; it does not retry.
    async fn send(&self, event: &TelemetryEvent) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered events, if the transport buffers.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
