//! # Webhook Intake Module
//!
//! Handles geofence webhook verification and normalization.
//!
//! The external location provider delivers geofence occurrences as HTTP POST
//! requests whose payload shape has drifted across provider versions. This
//! module owns the boundary types for a single request and the canonical
//! event produced from it; signature verification lives in [`signature`] and
//! payload-shape resolution in [`normalizer`].

use crate::{
    CorrelationId, EventId, ExternalGeofenceId, ProviderUserId, Timestamp, ValidationError,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod normalizer;
pub mod signature;

pub use normalizer::{EventNormalizer, NormalizedBatch, ParseFailure};
pub use signature::{SharedSecretVerifier, SignatureVerifier, WebhookSecret};

// ============================================================================
// Core Types
// ============================================================================

/// Primary header carrying the provider's HMAC signature
pub const SIGNATURE_HEADER: &str = "x-geofence-signature";

/// Fallback signature header used by older provider versions
pub const SIGNATURE_HEADER_FALLBACK: &str = "x-webhook-signature";

/// Raw HTTP request data from the provider's webhook delivery.
///
/// Transient: exists only for the duration of a single HTTP request and is
/// never persisted. The body is kept as raw bytes because the signature is
/// computed over the exact wire form; any re-serialization invalidates it.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub headers: WebhookHeaders,
    pub body: Bytes,
    pub correlation_id: CorrelationId,
    pub received_at: Timestamp,
}

impl WebhookRequest {
    /// Create new webhook request
    pub fn new(headers: WebhookHeaders, body: Bytes) -> Self {
        Self {
            headers,
            body,
            correlation_id: CorrelationId::new(),
            received_at: Timestamp::now(),
        }
    }

    /// Get signature from headers if present
    pub fn signature(&self) -> Option<&str> {
        self.headers.signature.as_deref()
    }
}

/// Provider-supplied HTTP headers required for processing
#[derive(Debug, Clone)]
pub struct WebhookHeaders {
    pub signature: Option<String>,
    pub content_type: String,
    pub user_agent: Option<String>,
}

impl WebhookHeaders {
    /// Parse headers from an HTTP header map.
    ///
    /// The signature is read from [`SIGNATURE_HEADER`] first and
    /// [`SIGNATURE_HEADER_FALLBACK`] second; the provider has shipped both
    /// names across versions. Lookup is case-insensitive on either name.
    pub fn from_http_headers(headers: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let lookup = |name: &str| {
            headers
                .get(name)
                .or_else(|| headers.get(&name.to_uppercase()))
                .cloned()
        };

        let signature = lookup(SIGNATURE_HEADER).or_else(|| lookup(SIGNATURE_HEADER_FALLBACK));

        let content_type = lookup("content-type").unwrap_or_else(|| "application/json".to_string());

        let user_agent = lookup("user-agent");

        let headers = Self {
            signature,
            content_type,
            user_agent,
        };

        headers.validate()?;
        Ok(headers)
    }

    /// Validate header values
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.content_type.starts_with("application/json") {
            return Err(ValidationError::InvalidFormat {
                field: "content_type".to_string(),
                message: "must be application/json".to_string(),
            });
        }

        Ok(())
    }
}

/// Kind of geofence occurrence reported by the provider.
///
/// Unknown or missing provider `type` strings map to [`Self::Unknown`]
/// rather than failing normalization; the provider ships new kinds without
/// notice and a single unrecognized event must not drop its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeofenceEventKind {
    Enter,
    Exit,
    Dwell,
    Unknown,
}

impl GeofenceEventKind {
    /// Map a provider `type` string to a kind.
    ///
    /// Accepts the provider's current lowercase names and the legacy
    /// dotted form (`user.entered_geofence`).
    pub fn from_provider(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "enter" | "entry" | "entered" | "user.entered_geofence" => Self::Enter,
            "exit" | "exited" | "left" | "user.exited_geofence" => Self::Exit,
            "dwell" | "dwelling" | "user.dwelled_in_geofence" => Self::Dwell,
            _ => Self::Unknown,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
            Self::Dwell => "dwell",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for GeofenceEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized, provider-shape-independent representation of a single
/// geofence occurrence.
///
/// Immutable once created; this is the unit of work handed to the task
/// queue. `event_id` is the provider-assigned identifier and is stable
/// across redeliveries, so idempotent processing keys on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub event_id: EventId,
    pub kind: GeofenceEventKind,
    pub user_id: ProviderUserId,
    pub geofence_external_id: ExternalGeofenceId,
    pub occurred_at: Timestamp,
    /// Provider attributes not modeled above, carried for downstream use
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// Error Types
// ============================================================================

/// Top-level error for webhook intake failures.
///
/// Everything here is permanent from the provider's point of view: a
/// rejected request is never enqueued and retrying the identical request
/// cannot change the outcome.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Signature header missing")]
    MissingSignature,

    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Webhook validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
}

impl WebhookError {
    /// Get error category for monitoring
    pub fn error_category(&self) -> crate::ErrorCategory {
        match self {
            Self::MissingSignature | Self::InvalidSignature => crate::ErrorCategory::Security,
            Self::Validation(_) => crate::ErrorCategory::Permanent,
            Self::MalformedPayload { .. } => crate::ErrorCategory::Permanent,
            Self::JsonParsing(_) => crate::ErrorCategory::Permanent,
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
