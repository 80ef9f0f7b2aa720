//! Tests for idempotent notification processing.

use super::*;
use crate::webhook::CanonicalEvent;
use crate::{ExternalGeofenceId, ProviderUserId, Timestamp};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

// ============================================================================
// Fakes
// ============================================================================

/// Directory fake backed by fixed mappings, with a switchable outage
struct FakeDirectory {
    users: Vec<String>,
    geofences: Vec<String>,
    unavailable: AtomicBool,
}

impl FakeDirectory {
    fn with_known(users: &[&str], geofences: &[&str]) -> Self {
        Self {
            users: users.iter().map(|s| s.to_string()).collect(),
            geofences: geofences.iter().map(|s| s.to_string()).collect(),
            unavailable: AtomicBool::new(false),
        }
    }

    fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_outage(&self) -> Result<(), CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CollaboratorError::Unavailable {
                message: "directory offline".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EntityDirectory for FakeDirectory {
    async fn find_user(
        &self,
        user_id: &ProviderUserId,
    ) -> Result<Option<UserHandle>, CollaboratorError> {
        self.check_outage()?;
        Ok(self
            .users
            .iter()
            .find(|u| u.as_str() == user_id.as_str())
            .map(|u| UserHandle {
                id: u.clone(),
                display_name: None,
            }))
    }

    async fn find_geofence(
        &self,
        external_id: &ExternalGeofenceId,
    ) -> Result<Option<GeofenceHandle>, CollaboratorError> {
        self.check_outage()?;
        Ok(self
            .geofences
            .iter()
            .find(|g| g.as_str() == external_id.as_str())
            .map(|g| GeofenceHandle {
                id: GeofenceId::new(),
                name: g.clone(),
            }))
    }
}

/// Sender fake that counts deliveries and can fail transiently
#[derive(Default)]
struct RecordingSender {
    deliveries: AtomicUsize,
    fail_next: AtomicBool,
}

impl RecordingSender {
    fn delivery_count(&self) -> usize {
        self.deliveries.load(Ordering::SeqCst)
    }

    fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn deliver(
        &self,
        _user: &UserHandle,
        _geofence: &GeofenceHandle,
        _event: &CanonicalEvent,
    ) -> Result<(), CollaboratorError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CollaboratorError::Timeout {
                message: "push gateway timed out".to_string(),
            });
        }
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn enter_event(event_id: &str) -> CanonicalEvent {
    CanonicalEvent {
        event_id: EventId::new(event_id.to_string()).unwrap(),
        kind: crate::webhook::GeofenceEventKind::Enter,
        user_id: ProviderUserId::new("u_1".to_string()).unwrap(),
        geofence_external_id: ExternalGeofenceId::new("g_1".to_string()).unwrap(),
        occurred_at: Timestamp::now(),
        attributes: Default::default(),
    }
}

fn processor_with(
    directory: Arc<FakeDirectory>,
    sender: Arc<RecordingSender>,
) -> GeofenceEventProcessor {
    GeofenceEventProcessor::new(
        directory,
        sender,
        Arc::new(InMemoryProcessedEventStore::new()),
    )
}

// ============================================================================
// Test: Happy Path
// ============================================================================

#[tokio::test]
async fn test_known_event_delivers_exactly_one_notification() {
    // Arrange
    let directory = Arc::new(FakeDirectory::with_known(&["u_1"], &["g_1"]));
    let sender = Arc::new(RecordingSender::default());
    let processor = processor_with(directory, sender.clone());

    // Act
    let outcome = processor.process(&enter_event("evt_1")).await.unwrap();

    // Assert
    assert_eq!(outcome, ProcessOutcome::Delivered);
    assert_eq!(sender.delivery_count(), 1);
}

// ============================================================================
// Test: Idempotency
// ============================================================================

#[tokio::test]
async fn test_redelivered_event_is_skipped_not_redelivered() {
    // Arrange
    let directory = Arc::new(FakeDirectory::with_known(&["u_1"], &["g_1"]));
    let sender = Arc::new(RecordingSender::default());
    let processor = processor_with(directory, sender.clone());
    let event = enter_event("evt_1");

    // Act: process the same event id twice (simulated provider redelivery)
    let first = processor.process(&event).await.unwrap();
    let second = processor.process(&event).await.unwrap();

    // Assert: one notification, second call short-circuits
    assert_eq!(first, ProcessOutcome::Delivered);
    assert_eq!(
        second,
        ProcessOutcome::Skipped(SkipReason::AlreadyProcessed)
    );
    assert_eq!(sender.delivery_count(), 1);
}

#[tokio::test]
async fn test_distinct_event_ids_each_deliver() {
    let directory = Arc::new(FakeDirectory::with_known(&["u_1"], &["g_1"]));
    let sender = Arc::new(RecordingSender::default());
    let processor = processor_with(directory, sender.clone());

    processor.process(&enter_event("evt_1")).await.unwrap();
    processor.process(&enter_event("evt_2")).await.unwrap();

    assert_eq!(sender.delivery_count(), 2);
}

// ============================================================================
// Test: Data Errors Are Terminal
// ============================================================================

#[tokio::test]
async fn test_unknown_user_is_skipped_not_retried() {
    // Arrange: directory knows the geofence but not the user
    let directory = Arc::new(FakeDirectory::with_known(&[], &["g_1"]));
    let sender = Arc::new(RecordingSender::default());
    let processor = processor_with(directory, sender.clone());

    // Act
    let outcome = processor.process(&enter_event("evt_1")).await.unwrap();

    // Assert: success-with-skip, no notification, no error for the queue
    assert_eq!(outcome, ProcessOutcome::Skipped(SkipReason::UnknownUser));
    assert_eq!(sender.delivery_count(), 0);
}

#[tokio::test]
async fn test_unknown_geofence_is_skipped_not_retried() {
    let directory = Arc::new(FakeDirectory::with_known(&["u_1"], &[]));
    let sender = Arc::new(RecordingSender::default());
    let processor = processor_with(directory, sender.clone());

    let outcome = processor.process(&enter_event("evt_1")).await.unwrap();

    assert_eq!(
        outcome,
        ProcessOutcome::Skipped(SkipReason::UnknownGeofence)
    );
    assert_eq!(sender.delivery_count(), 0);
}

#[tokio::test]
async fn test_data_error_marker_persists_across_redelivery() {
    // A redelivered unmappable event short-circuits instead of re-querying
    let directory = Arc::new(FakeDirectory::with_known(&[], &["g_1"]));
    let sender = Arc::new(RecordingSender::default());
    let processor = processor_with(directory, sender.clone());
    let event = enter_event("evt_1");

    let first = processor.process(&event).await.unwrap();
    let second = processor.process(&event).await.unwrap();

    assert_eq!(first, ProcessOutcome::Skipped(SkipReason::UnknownUser));
    assert_eq!(
        second,
        ProcessOutcome::Skipped(SkipReason::AlreadyProcessed)
    );
}

#[tokio::test]
async fn test_unknown_kind_is_recorded_and_skipped() {
    let directory = Arc::new(FakeDirectory::with_known(&["u_1"], &["g_1"]));
    let sender = Arc::new(RecordingSender::default());
    let processor = processor_with(directory, sender.clone());

    let mut event = enter_event("evt_1");
    event.kind = crate::webhook::GeofenceEventKind::Unknown;

    let outcome = processor.process(&event).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Skipped(SkipReason::UnhandledKind));
    assert_eq!(sender.delivery_count(), 0);
}

// ============================================================================
// Test: Transient Errors Are Retryable
// ============================================================================

#[tokio::test]
async fn test_directory_outage_is_transient_and_marker_is_released() {
    // Arrange
    let directory = Arc::new(FakeDirectory::with_known(&["u_1"], &["g_1"]));
    let sender = Arc::new(RecordingSender::default());
    let processor = processor_with(directory.clone(), sender.clone());
    let event = enter_event("evt_1");

    // Act: first attempt fails transiently
    directory.set_unavailable(true);
    let error = processor.process(&event).await.unwrap_err();
    assert!(error.is_transient());

    // Act: retry after the outage clears
    directory.set_unavailable(false);
    let outcome = processor.process(&event).await.unwrap();

    // Assert: the retry actually delivered — the marker was released
    assert_eq!(outcome, ProcessOutcome::Delivered);
    assert_eq!(sender.delivery_count(), 1);
}

#[tokio::test]
async fn test_sender_failure_is_transient_and_retry_delivers() {
    let directory = Arc::new(FakeDirectory::with_known(&["u_1"], &["g_1"]));
    let sender = Arc::new(RecordingSender::default());
    let processor = processor_with(directory, sender.clone());
    let event = enter_event("evt_1");

    sender.fail_next();
    let error = processor.process(&event).await.unwrap_err();
    assert!(error.is_transient());
    assert_eq!(sender.delivery_count(), 0);

    let outcome = processor.process(&event).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Delivered);
    assert_eq!(sender.delivery_count(), 1);
}
