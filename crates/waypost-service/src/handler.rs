//! Bridges the notification processor onto the queue's handler interface.

use async_trait::async_trait;
use std::sync::Arc;
use task_runtime::{TaskError, TaskHandler};
use tracing::debug;
use waypost_core::webhook::CanonicalEvent;
use waypost_core::{GeofenceEventProcessor, ProcessOutcome};

/// [`TaskHandler`] that delegates to the [`GeofenceEventProcessor`].
///
/// Outcome mapping: any `ProcessOutcome` — including skips for data errors —
/// is queue success; only transient processor errors come back retryable.
pub struct ProcessorTaskHandler {
    processor: Arc<GeofenceEventProcessor>,
}

impl ProcessorTaskHandler {
    /// Wrap a processor for queue consumption
    pub fn new(processor: Arc<GeofenceEventProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl TaskHandler for ProcessorTaskHandler {
    async fn handle(&self, event: &CanonicalEvent) -> Result<(), TaskError> {
        match self.processor.process(event).await {
            Ok(ProcessOutcome::Delivered) => Ok(()),
            Ok(ProcessOutcome::Skipped(reason)) => {
                debug!(
                    event_id = %event.event_id,
                    reason = reason.as_str(),
                    "Event completed without notification"
                );
                Ok(())
            }
            Err(error) if error.is_transient() => Err(TaskError::retryable(error.to_string())),
            Err(error) => Err(TaskError::permanent(error.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
