//! Shared fixtures for webhook pipeline integration tests.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use task_runtime::{NotificationQueue, QueueConfig, TaskError, TaskHandler};
use tokio::sync::Notify;
use waypost_core::webhook::{
    signature, CanonicalEvent, SharedSecretVerifier, WebhookSecret,
};
use waypost_core::{
    CollaboratorError, EntityDirectory, ExternalGeofenceId, GeofenceEventProcessor,
    GeofenceHandle, GeofenceId, InMemoryProcessedEventStore, NotificationSender, ProcessOutcome,
    ProviderUserId, UserHandle,
};
use waypost_api::{AppState, ServiceConfig};

pub const TEST_SECRET: &str = "integration_test_secret";

/// Source address stamped on handler invocations
pub fn test_source() -> axum::extract::ConnectInfo<SocketAddr> {
    axum::extract::ConnectInfo(SocketAddr::from(([192, 0, 2, 44], 51000)))
}

/// Headers carrying a valid provider signature for `body`
pub fn signed_headers(body: &[u8]) -> HeaderMap {
    let secret = WebhookSecret::new(TEST_SECRET);
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-geofence-signature",
        HeaderValue::from_str(&signature::sign(&secret, body)).unwrap(),
    );
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers
}

/// Headers with a signature that does not match `body`
pub fn badly_signed_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-geofence-signature",
        HeaderValue::from_static("sha256=deadbeefdeadbeefdeadbeefdeadbeef"),
    );
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers
}

// ============================================================================
// Collaborator Fakes
// ============================================================================

/// Directory that resolves every reference
pub struct AllKnownDirectory;

#[async_trait]
impl EntityDirectory for AllKnownDirectory {
    async fn find_user(
        &self,
        user_id: &ProviderUserId,
    ) -> Result<Option<UserHandle>, CollaboratorError> {
        Ok(Some(UserHandle {
            id: user_id.as_str().to_string(),
            display_name: None,
        }))
    }

    async fn find_geofence(
        &self,
        external_id: &ExternalGeofenceId,
    ) -> Result<Option<GeofenceHandle>, CollaboratorError> {
        Ok(Some(GeofenceHandle {
            id: GeofenceId::new(),
            name: external_id.as_str().to_string(),
        }))
    }
}

/// Notification sender fake with optional gating and forced failure
#[derive(Default)]
pub struct FakeSender {
    pub delivered: AtomicUsize,
    pub hold: AtomicBool,
    pub release: Notify,
    pub fail_always: AtomicBool,
}

impl FakeSender {
    pub fn delivered_count(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSender for FakeSender {
    async fn deliver(
        &self,
        _user: &UserHandle,
        _geofence: &GeofenceHandle,
        _event: &CanonicalEvent,
    ) -> Result<(), CollaboratorError> {
        if self.fail_always.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Timeout {
                message: "push gateway timed out".to_string(),
            });
        }
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Queue handler running the real processor against the fakes
pub struct ProcessorHandler {
    processor: GeofenceEventProcessor,
}

#[async_trait]
impl TaskHandler for ProcessorHandler {
    async fn handle(&self, event: &CanonicalEvent) -> Result<(), TaskError> {
        match self.processor.process(event).await {
            Ok(ProcessOutcome::Delivered) | Ok(ProcessOutcome::Skipped(_)) => Ok(()),
            Err(error) if error.is_transient() => Err(TaskError::retryable(error.to_string())),
            Err(error) => Err(TaskError::permanent(error.to_string())),
        }
    }
}

// ============================================================================
// State Construction
// ============================================================================

/// Build an [`AppState`] wired end to end: real verifier, normalizer,
/// queue, and processor, with faked collaborators.
pub fn pipeline_state(sender: Arc<FakeSender>) -> (AppState, NotificationQueue) {
    let mut config = ServiceConfig::default();
    config.webhook.secret = Some(TEST_SECRET.to_string());

    let processor = GeofenceEventProcessor::new(
        Arc::new(AllKnownDirectory),
        sender,
        Arc::new(InMemoryProcessedEventStore::new()),
    );

    let queue = NotificationQueue::start(
        QueueConfig::default(),
        Arc::new(ProcessorHandler { processor }),
    );

    let verifier = Arc::new(SharedSecretVerifier::new(WebhookSecret::new(TEST_SECRET)));

    let state = AppState::new(config, verifier, queue.clone());
    (state, queue)
}

/// Poll until `condition` holds; panics after `max_iterations`.
pub async fn wait_until(condition: impl Fn() -> bool, max_iterations: usize) {
    for _ in 0..max_iterations {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached within {} iterations", max_iterations);
}
