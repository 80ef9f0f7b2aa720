//! Reconciliation of local geofence definitions against the provider.
//!
//! Local definitions are authoritative. A sync run pushes every matching
//! definition to the provider: definitions without an `external_id` are
//! created remotely and the returned identifier is written back; definitions
//! with one are updated in place. Each definition's outcome is independent —
//! a provider rejection or timeout is recorded and the run continues.
//!
//! Re-running after a partial failure is safe: `external_id` presence, not
//! run completion, routes a definition to update-vs-create, so remote
//! geofences are never duplicated.

use crate::{ExternalGeofenceId, GeofenceId, GeofenceTag, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

// ============================================================================
// Geofence Definition Types
// ============================================================================

/// Geometry configuration pushed to the provider.
///
/// Opaque from this crate's perspective — point-in-polygon and radius math
/// happen on the provider's side, whose events are trusted once verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "shape")]
pub enum GeofenceGeometry {
    /// Circle centered on a WGS84 coordinate
    Circle {
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    },

    /// Closed polygon of WGS84 vertices
    Polygon { vertices: Vec<[f64; 2]> },
}

/// Locally authoritative geofence definition.
///
/// Created and edited by business workflows outside this core. The sync
/// reconciler exclusively owns the `external_id` and `synced_at` fields and
/// writes them back after a successful create or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceDefinition {
    pub id: GeofenceId,
    pub tag: GeofenceTag,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub geometry: GeofenceGeometry,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub external_id: Option<ExternalGeofenceId>,
    #[serde(default)]
    pub synced_at: Option<Timestamp>,
}

fn default_enabled() -> bool {
    true
}

/// A geofence as reported by the provider's list operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteGeofence {
    pub external_id: ExternalGeofenceId,
    pub name: String,
}

// ============================================================================
// Collaborator Interfaces
// ============================================================================

/// Error accessing the local geofence definition store
#[derive(Debug, Clone, thiserror::Error)]
pub enum GeofenceStoreError {
    #[error("Geofence store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Geofence store write failed: {message}")]
    WriteFailed { message: String },
}

/// Interface for reading local definitions and writing back sync state
#[async_trait]
pub trait GeofenceStore: Send + Sync {
    /// List definitions, optionally restricted to one tag
    async fn list(
        &self,
        tag: Option<&GeofenceTag>,
    ) -> Result<Vec<GeofenceDefinition>, GeofenceStoreError>;

    /// Record a successful sync: store `external_id` and `synced_at` for
    /// the definition. No other component writes these fields.
    async fn record_sync(
        &self,
        id: GeofenceId,
        external_id: &ExternalGeofenceId,
        synced_at: Timestamp,
    ) -> Result<(), GeofenceStoreError>;
}

/// Error from the provider's geofence API
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderApiError {
    #[error("Provider rejected the request: {message}")]
    Rejected { message: String },

    #[error("Provider request failed: {message}")]
    Network { message: String },

    #[error("Provider call timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl ProviderApiError {
    /// Check if error is transient and the call could be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rejected { .. } => false,
            Self::Network { .. } => true,
            Self::Timeout { .. } => true,
        }
    }
}

/// Interface to the provider's geofence catalogue
#[async_trait]
pub trait GeofenceProviderClient: Send + Sync {
    /// List the provider's copies of our geofences
    async fn list_remote(&self) -> Result<Vec<RemoteGeofence>, ProviderApiError>;

    /// Create a geofence remotely, returning the provider-assigned id
    async fn create_remote(
        &self,
        definition: &GeofenceDefinition,
    ) -> Result<ExternalGeofenceId, ProviderApiError>;

    /// Push current local geometry/config to an existing remote geofence
    async fn update_remote(
        &self,
        external_id: &ExternalGeofenceId,
        definition: &GeofenceDefinition,
    ) -> Result<(), ProviderApiError>;
}

// ============================================================================
// Sync Run Types
// ============================================================================

/// Options for one reconciliation run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Restrict the run to definitions carrying this tag
    pub tag: Option<GeofenceTag>,
    /// Re-push every matching definition regardless of `synced_at` recency
    pub force: bool,
}

/// One definition that could not be synced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub geofence_id: GeofenceId,
    pub reason: String,
}

/// Aggregate outcome of one reconciliation run.
///
/// Produced fresh per run; partial completion is expected and the caller
/// renders counts plus itemized reasons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
    pub failures: Vec<SyncFailure>,
}

impl SyncResult {
    /// True when no definition failed
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    fn record_failure(&mut self, geofence_id: GeofenceId, reason: String) {
        self.failed += 1;
        self.failures.push(SyncFailure {
            geofence_id,
            reason,
        });
    }
}

/// Error aborting a sync run before any definitions were attempted
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to list local geofence definitions: {0}")]
    Store(#[from] GeofenceStoreError),
}

/// Tunables for the reconciler
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bound on each individual provider call
    pub call_timeout: Duration,
    /// Window within which an already-synced definition is skipped
    /// (bypassed by force mode)
    pub recency_window: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            recency_window: Duration::from_secs(900),
        }
    }
}

// ============================================================================
// SyncReconciler
// ============================================================================

/// Compares local geofence definitions against the provider's catalogue and
/// reconciles differences.
///
/// Per-definition provider calls are issued sequentially, which keeps the
/// result accumulator plain and makes the cancellation points explicit.
pub struct SyncReconciler {
    store: Arc<dyn GeofenceStore>,
    provider: Arc<dyn GeofenceProviderClient>,
    config: SyncConfig,
}

impl SyncReconciler {
    /// Create a reconciler with injected collaborators
    pub fn new(
        store: Arc<dyn GeofenceStore>,
        provider: Arc<dyn GeofenceProviderClient>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Reconcile every matching definition.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] only when the local definitions cannot be
    /// listed at all. Per-definition failures are aggregated into the
    /// returned [`SyncResult`] instead.
    pub async fn sync_all(&self, options: SyncOptions) -> Result<SyncResult, SyncError> {
        let (_tx, rx) = watch::channel(false);
        self.sync_all_with_cancellation(options, rx).await
    }

    /// Reconcile with a cancellation signal.
    ///
    /// Cancellation is checked between definitions: completed per-definition
    /// writes stay intact (no rollback) and the partial [`SyncResult`]
    /// accumulated so far is returned.
    pub async fn sync_all_with_cancellation(
        &self,
        options: SyncOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<SyncResult, SyncError> {
        let definitions = self.store.list(options.tag.as_ref()).await?;

        info!(
            definitions = definitions.len(),
            tag = options.tag.as_ref().map(GeofenceTag::as_str),
            force = options.force,
            "Starting geofence sync run"
        );

        // Operator visibility only: a remote listing failure does not abort
        // the run, and remote copies no local definition references are
        // flagged for cleanup.
        self.report_remote_drift(&definitions).await;

        let mut result = SyncResult::default();

        for definition in &definitions {
            if *cancel.borrow() {
                warn!(
                    completed = result.created + result.updated + result.skipped + result.failed,
                    remaining = definitions.len() as u32
                        - (result.created + result.updated + result.skipped + result.failed),
                    "Sync run cancelled, returning partial result"
                );
                break;
            }

            self.sync_one(definition, options.force, &mut result).await;
        }

        info!(
            created = result.created,
            updated = result.updated,
            skipped = result.skipped,
            failed = result.failed,
            "Geofence sync run finished"
        );

        Ok(result)
    }

    /// Reconcile a single definition, recording its outcome.
    async fn sync_one(&self, definition: &GeofenceDefinition, force: bool, result: &mut SyncResult) {
        if !definition.enabled {
            result.skipped += 1;
            return;
        }

        match &definition.external_id {
            None => self.create_one(definition, result).await,
            Some(external_id) => {
                let recently_synced = definition
                    .synced_at
                    .is_some_and(|synced_at| synced_at.is_within(self.config.recency_window));

                if recently_synced && !force {
                    result.skipped += 1;
                    return;
                }

                self.update_one(definition, external_id, result).await;
            }
        }
    }

    async fn create_one(&self, definition: &GeofenceDefinition, result: &mut SyncResult) {
        let created = self
            .bounded(self.provider.create_remote(definition))
            .await;

        let external_id = match created {
            Ok(external_id) => external_id,
            Err(error) => {
                warn!(
                    geofence_id = %definition.id,
                    error = %error,
                    "Failed to create geofence remotely"
                );
                result.record_failure(definition.id, error.to_string());
                return;
            }
        };

        // The write-back is what makes re-runs route this definition to
        // update instead of create; a failure here must be surfaced loudly.
        match self
            .store
            .record_sync(definition.id, &external_id, Timestamp::now())
            .await
        {
            Ok(()) => {
                info!(
                    geofence_id = %definition.id,
                    external_id = %external_id,
                    "Created geofence remotely"
                );
                result.created += 1;
            }
            Err(error) => {
                warn!(
                    geofence_id = %definition.id,
                    external_id = %external_id,
                    error = %error,
                    "Geofence created remotely but external id write-back failed"
                );
                result.record_failure(
                    definition.id,
                    format!(
                        "created remotely as '{}' but recording the external id failed: {}",
                        external_id, error
                    ),
                );
            }
        }
    }

    async fn update_one(
        &self,
        definition: &GeofenceDefinition,
        external_id: &ExternalGeofenceId,
        result: &mut SyncResult,
    ) {
        let updated = self
            .bounded(self.provider.update_remote(external_id, definition))
            .await;

        if let Err(error) = updated {
            warn!(
                geofence_id = %definition.id,
                external_id = %external_id,
                error = %error,
                "Failed to update geofence remotely"
            );
            result.record_failure(definition.id, error.to_string());
            return;
        }

        match self
            .store
            .record_sync(definition.id, external_id, Timestamp::now())
            .await
        {
            Ok(()) => {
                info!(
                    geofence_id = %definition.id,
                    external_id = %external_id,
                    "Updated geofence remotely"
                );
                result.updated += 1;
            }
            Err(error) => {
                // The remote copy is current; only the local freshness
                // marker is stale. Count the update but surface the reason.
                warn!(
                    geofence_id = %definition.id,
                    error = %error,
                    "Updated remotely but synced_at write-back failed"
                );
                result.updated += 1;
            }
        }
    }

    /// Log drift between local definitions and the provider's catalogue.
    async fn report_remote_drift(&self, definitions: &[GeofenceDefinition]) {
        let remote = match self.bounded(self.provider.list_remote()).await {
            Ok(remote) => remote,
            Err(error) => {
                warn!(error = %error, "Could not list remote geofences for drift report");
                return;
            }
        };

        for remote_geofence in &remote {
            let known = definitions
                .iter()
                .any(|d| d.external_id.as_ref() == Some(&remote_geofence.external_id));
            if !known {
                warn!(
                    external_id = %remote_geofence.external_id,
                    name = %remote_geofence.name,
                    "Remote geofence has no local definition"
                );
            }
        }
    }

    /// Apply the per-call timeout to a provider operation.
    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, ProviderApiError>>,
    ) -> Result<T, ProviderApiError> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderApiError::Timeout {
                seconds: self.config.call_timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
