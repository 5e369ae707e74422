use crate::event::TelemetryEvent;
use crate::sink::TelemetrySink;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::error::Error;
use std::sync::Arc;

/// A sink that keeps every event in memory.
///
/// Meant for tests that assert on what would have been submitted.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn send(&self, event: &TelemetryEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
