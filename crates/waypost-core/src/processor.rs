//! Idempotent notification processing for canonical geofence events.
//!
//! [`GeofenceEventProcessor`] consumes one [`CanonicalEvent`] and performs
//! the business side effect: resolve the provider's user and geofence
//! references to internal entities and deliver a notification. All external
//! collaborators are injected as trait objects so the processor can be
//! exercised with in-memory fakes.
//!
//! Processing the same `event_id` twice must not duplicate user-visible
//! notifications. A processed-event marker is checked-and-recorded before
//! the notification is dispatched; redeliveries short-circuit with a
//! [`ProcessOutcome::Skipped`] outcome. When a collaborator fails
//! transiently after the marker was written, the marker is forgotten again
//! so the queue's retry re-executes the side effect.

use crate::webhook::{CanonicalEvent, GeofenceEventKind};
use crate::{EventId, ExternalGeofenceId, GeofenceId, ProviderUserId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

// ============================================================================
// Collaborator Types
// ============================================================================

/// Internal handle for a user resolved from a provider user id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserHandle {
    pub id: String,
    pub display_name: Option<String>,
}

/// Internal handle for a geofence resolved from a provider geofence id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeofenceHandle {
    pub id: GeofenceId,
    pub name: String,
}

/// Failure talking to an external collaborator.
///
/// Both variants are transient: the collaborator exists but could not be
/// reached in time. A lookup miss is `Ok(None)`, never an error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Collaborator timed out: {message}")]
    Timeout { message: String },

    #[error("Collaborator unavailable: {message}")]
    Unavailable { message: String },
}

/// Interface resolving provider-side references to internal entities
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    /// Look up the internal user for a provider user id
    async fn find_user(
        &self,
        user_id: &ProviderUserId,
    ) -> Result<Option<UserHandle>, CollaboratorError>;

    /// Look up the internal geofence for a provider geofence id
    async fn find_geofence(
        &self,
        external_id: &ExternalGeofenceId,
    ) -> Result<Option<GeofenceHandle>, CollaboratorError>;
}

/// Interface delivering a notification for a resolved user and event.
///
/// The transport (push, SMS, email) is outside this crate; implementations
/// report only success or a transient failure.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn deliver(
        &self,
        user: &UserHandle,
        geofence: &GeofenceHandle,
        event: &CanonicalEvent,
    ) -> Result<(), CollaboratorError>;
}

/// Interface for the processed-event marker store.
///
/// The marker is the idempotency anchor for the whole pipeline: whichever
/// worker records an `event_id` first owns its side effect. Implementations
/// must provide atomic check-or-set semantics under concurrent workers.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Atomically record `event_id` as processed.
    ///
    /// Returns `true` when the marker was newly recorded and `false` when
    /// the event was already processed.
    async fn check_and_record(&self, event_id: &EventId) -> Result<bool, CollaboratorError>;

    /// Remove a previously recorded marker.
    ///
    /// Compensation path: called when a side effect fails transiently after
    /// the marker was written, so the retry re-executes it.
    async fn forget(&self, event_id: &EventId) -> Result<(), CollaboratorError>;
}

/// In-memory [`ProcessedEventStore`] for tests and single-process
/// deployments.
#[derive(Debug, Default)]
pub struct InMemoryProcessedEventStore {
    seen: Mutex<HashSet<EventId>>,
}

impl InMemoryProcessedEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded markers
    pub fn len(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or(0)
    }

    /// True when no markers are recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn check_and_record(&self, event_id: &EventId) -> Result<bool, CollaboratorError> {
        let mut seen = self.seen.lock().map_err(|_| CollaboratorError::Unavailable {
            message: "processed-event store lock poisoned".to_string(),
        })?;
        Ok(seen.insert(event_id.clone()))
    }

    async fn forget(&self, event_id: &EventId) -> Result<(), CollaboratorError> {
        let mut seen = self.seen.lock().map_err(|_| CollaboratorError::Unavailable {
            message: "processed-event store lock poisoned".to_string(),
        })?;
        seen.remove(event_id);
        Ok(())
    }
}

// ============================================================================
// Outcome and Error Types
// ============================================================================

/// Why an event completed without a notification being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The event id was already processed (provider redelivery)
    AlreadyProcessed,
    /// The event kind is not one this deployment notifies on
    UnhandledKind,
    /// No internal user maps to the provider user id
    UnknownUser,
    /// No internal geofence maps to the provider geofence id
    UnknownGeofence,
}

impl SkipReason {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyProcessed => "already_processed",
            Self::UnhandledKind => "unhandled_kind",
            Self::UnknownUser => "unknown_user",
            Self::UnknownGeofence => "unknown_geofence",
        }
    }
}

/// Terminal outcome of processing one canonical event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exactly one notification was delivered
    Delivered,
    /// Processing completed without a notification
    Skipped(SkipReason),
}

/// Error processing a canonical event.
///
/// Only failures worth re-scheduling surface here; data errors (missing
/// entity mappings) are terminal and reported as [`ProcessOutcome::Skipped`]
/// because retrying cannot fix a missing mapping.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Transient processing failure: {message}")]
    Transient { message: String },

    #[error("Internal processing failure: {message}")]
    Internal { message: String },
}

impl ProcessingError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<CollaboratorError> for ProcessingError {
    fn from(error: CollaboratorError) -> Self {
        Self::Transient {
            message: error.to_string(),
        }
    }
}

// ============================================================================
// GeofenceEventProcessor
// ============================================================================

/// Processes canonical events into notification side effects.
///
/// Safe to call repeatedly for the same `event_id`: the processed-event
/// marker guarantees at most one delivered notification per distinct event.
pub struct GeofenceEventProcessor {
    directory: Arc<dyn EntityDirectory>,
    sender: Arc<dyn NotificationSender>,
    processed: Arc<dyn ProcessedEventStore>,
}

impl GeofenceEventProcessor {
    /// Create a processor with injected collaborators
    pub fn new(
        directory: Arc<dyn EntityDirectory>,
        sender: Arc<dyn NotificationSender>,
        processed: Arc<dyn ProcessedEventStore>,
    ) -> Self {
        Self {
            directory,
            sender,
            processed,
        }
    }

    /// Process one canonical event.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::Transient`] when a collaborator timed out
    /// or was unavailable; the caller (the task queue) re-schedules the
    /// task. All other conditions are terminal outcomes, not errors.
    pub async fn process(
        &self,
        event: &CanonicalEvent,
    ) -> Result<ProcessOutcome, ProcessingError> {
        // Claim the event before any side effect; the loser of a
        // redelivery race short-circuits here.
        if !self.processed.check_and_record(&event.event_id).await? {
            info!(
                event_id = %event.event_id,
                "Event already processed, skipping"
            );
            return Ok(ProcessOutcome::Skipped(SkipReason::AlreadyProcessed));
        }

        if event.kind == GeofenceEventKind::Unknown {
            info!(
                event_id = %event.event_id,
                "Unrecognized event kind, recorded and skipped"
            );
            return Ok(ProcessOutcome::Skipped(SkipReason::UnhandledKind));
        }

        match self.resolve_and_deliver(event).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                // The side effect did not happen; release the marker so the
                // retry is not short-circuited into a lost notification.
                if let Err(forget_error) = self.processed.forget(&event.event_id).await {
                    warn!(
                        event_id = %event.event_id,
                        error = %forget_error,
                        "Failed to release processed marker after transient failure"
                    );
                }
                Err(error)
            }
        }
    }

    async fn resolve_and_deliver(
        &self,
        event: &CanonicalEvent,
    ) -> Result<ProcessOutcome, ProcessingError> {
        let Some(user) = self.directory.find_user(&event.user_id).await? else {
            // Data error, not transient: retrying cannot fix a missing
            // mapping. The marker stays recorded.
            warn!(
                event_id = %event.event_id,
                user_id = %event.user_id,
                "No internal user for provider user id"
            );
            return Ok(ProcessOutcome::Skipped(SkipReason::UnknownUser));
        };

        let Some(geofence) = self
            .directory
            .find_geofence(&event.geofence_external_id)
            .await?
        else {
            warn!(
                event_id = %event.event_id,
                geofence_external_id = %event.geofence_external_id,
                "No internal geofence for provider geofence id"
            );
            return Ok(ProcessOutcome::Skipped(SkipReason::UnknownGeofence));
        };

        self.sender.deliver(&user, &geofence, event).await?;

        info!(
            event_id = %event.event_id,
            kind = %event.kind,
            user = %user.id,
            geofence = %geofence.name,
            "Notification delivered"
        );

        Ok(ProcessOutcome::Delivered)
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
