//! Event normalization for heterogeneous provider payload shapes.
//!
//! The provider is not consistent about batching: a delivery may carry a
//! list under `events`, a single object under `event`, or — in the
//! degenerate case — the entire payload may be one event with no wrapper.
//! [`EventNormalizer`] resolves the shape with an explicit, ordered matcher
//! and maps each element independently, so one malformed element never
//! drops its valid siblings.

use crate::webhook::{CanonicalEvent, GeofenceEventKind};
use crate::{EventId, ExternalGeofenceId, ProviderUserId, Timestamp};
use serde_json::Value;
use tracing::debug;

// ============================================================================
// Batch Types
// ============================================================================

/// A single element that could not be mapped to a [`CanonicalEvent`].
///
/// Recorded instead of aborting the batch; the index refers to the
/// element's position in the resolved shape (0 for singular payloads).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub index: usize,
    pub reason: String,
}

/// Result of normalizing one webhook payload.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    /// Successfully mapped events, in payload order
    pub events: Vec<CanonicalEvent>,
    /// Elements skipped as malformed, in payload order
    pub failures: Vec<ParseFailure>,
}

impl NormalizedBatch {
    /// True when the payload produced neither events nor failures
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.failures.is_empty()
    }
}

// ============================================================================
// EventNormalizer
// ============================================================================

/// Maps parsed provider payloads into ordered sequences of canonical events.
///
/// Resolution order, first match wins:
///
/// 1. top-level `events` array — each element mapped independently
/// 2. top-level `event` object — mapped as a one-element sequence
/// 3. fallback — the whole payload treated as a single event
///
/// An empty but well-formed payload yields an empty batch, not an error.
#[derive(Debug, Clone, Default)]
pub struct EventNormalizer;

impl EventNormalizer {
    /// Create a new normalizer
    pub fn new() -> Self {
        Self
    }

    /// Normalize a parsed payload into canonical events.
    ///
    /// `received_at` is used for events whose payload carries no usable
    /// occurrence timestamp.
    pub fn normalize(&self, body: &Value, received_at: Timestamp) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        match Self::resolve_shape(body) {
            PayloadShape::Batch(elements) => {
                for (index, element) in elements.iter().enumerate() {
                    Self::map_into(element, index, received_at, &mut batch);
                }
            }
            PayloadShape::Single(element) => {
                Self::map_into(element, 0, received_at, &mut batch);
            }
            PayloadShape::Empty => {}
            PayloadShape::Invalid(reason) => {
                batch.failures.push(ParseFailure { index: 0, reason });
            }
        }

        debug!(
            accepted = batch.events.len(),
            failed = batch.failures.len(),
            "Normalized webhook payload"
        );

        batch
    }

    /// Resolve which of the provider's payload shapes this body uses.
    fn resolve_shape(body: &Value) -> PayloadShape<'_> {
        if let Some(events) = body.get("events") {
            return match events.as_array() {
                Some(elements) if elements.is_empty() => PayloadShape::Empty,
                Some(elements) => PayloadShape::Batch(elements),
                None => PayloadShape::Invalid("'events' field is not an array".to_string()),
            };
        }

        if let Some(event) = body.get("event") {
            return if event.is_object() {
                PayloadShape::Single(event)
            } else {
                PayloadShape::Invalid("'event' field is not an object".to_string())
            };
        }

        if body.as_object().is_some_and(|map| map.is_empty()) {
            return PayloadShape::Empty;
        }

        PayloadShape::Single(body)
    }

    fn map_into(
        element: &Value,
        index: usize,
        received_at: Timestamp,
        batch: &mut NormalizedBatch,
    ) {
        match Self::map_element(element, received_at) {
            Ok(event) => batch.events.push(event),
            Err(reason) => batch.failures.push(ParseFailure { index, reason }),
        }
    }

    /// Map one payload element to a [`CanonicalEvent`].
    ///
    /// Required fields: an event id, a user reference, and a geofence
    /// reference. Each is probed under the aliases the provider has used
    /// across versions. A missing or unknown `type` maps to
    /// [`GeofenceEventKind::Unknown`]; a missing or unparsable timestamp
    /// falls back to `received_at`.
    fn map_element(element: &Value, received_at: Timestamp) -> Result<CanonicalEvent, String> {
        if !element.is_object() {
            return Err("element is not a JSON object".to_string());
        }

        let event_id = Self::string_at(element, &["id", "eventId", "_id"])
            .ok_or_else(|| "missing event id ('id', 'eventId', or '_id')".to_string())?;
        let event_id = EventId::new(event_id).map_err(|e| format!("invalid event id: {}", e))?;

        let user_id = Self::string_at(element, &["userId", "user.id", "user._id"])
            .ok_or_else(|| "missing user reference ('userId' or 'user.id')".to_string())?;
        let user_id =
            ProviderUserId::new(user_id).map_err(|e| format!("invalid user id: {}", e))?;

        let geofence_id = Self::string_at(
            element,
            &[
                "geofenceId",
                "geofence.externalId",
                "geofence.id",
                "geofence._id",
            ],
        )
        .ok_or_else(|| "missing geofence reference ('geofenceId' or 'geofence.id')".to_string())?;
        let geofence_external_id = ExternalGeofenceId::new(geofence_id)
            .map_err(|e| format!("invalid geofence id: {}", e))?;

        let kind = Self::string_at(element, &["type", "event"])
            .map(|value| GeofenceEventKind::from_provider(&value))
            .unwrap_or(GeofenceEventKind::Unknown);

        let occurred_at = Self::string_at(element, &["occurredAt", "createdAt"])
            .and_then(|value| Timestamp::from_rfc3339(&value).ok())
            .unwrap_or(received_at);

        let attributes = element
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(key, _)| !Self::is_consumed_field(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(CanonicalEvent {
            event_id,
            kind,
            user_id,
            geofence_external_id,
            occurred_at,
            attributes,
        })
    }

    /// Fields already lifted into the canonical representation
    fn is_consumed_field(key: &str) -> bool {
        matches!(
            key,
            "id" | "eventId" | "_id" | "userId" | "user" | "geofenceId" | "geofence" | "type"
                | "event" | "occurredAt" | "createdAt"
        )
    }

    /// Probe `element` for a string value under any of the given dot-paths.
    ///
    /// Numbers are stringified; the provider has shipped numeric ids.
    fn string_at(element: &Value, paths: &[&str]) -> Option<String> {
        for path in paths {
            let mut current = element;
            let mut found = true;

            for segment in path.split('.') {
                match current.get(segment) {
                    Some(next) => current = next,
                    None => {
                        found = false;
                        break;
                    }
                }
            }

            if !found {
                continue;
            }

            match current {
                Value::String(s) if !s.is_empty() => return Some(s.clone()),
                Value::Number(n) => return Some(n.to_string()),
                _ => continue,
            }
        }

        None
    }
}

/// Resolved payload shape, in resolution order
enum PayloadShape<'a> {
    Batch(&'a [Value]),
    Single(&'a Value),
    Empty,
    Invalid(String),
}

#[cfg(test)]
#[path = "normalizer_tests.rs"]
mod tests;
