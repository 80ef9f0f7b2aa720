//! Task types for queue operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;
use waypost_core::webhook::CanonicalEvent;
use waypost_core::{Timestamp, ValidationError};

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for tasks within the queue system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Ulid);

impl TaskId {
    /// Generate new random task ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named queue partition isolating one workload from unrelated queues.
///
/// # Validation Rules
/// - Must be 1-64 characters
/// - Must contain only ASCII alphanumeric characters, hyphens, underscores
/// - No leading/trailing hyphens or consecutive hyphens
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueLane(String);

impl QueueLane {
    /// Create new lane name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();

        if name.is_empty() || name.len() > 64 {
            return Err(ValidationError::InvalidFormat {
                field: "queue_lane".to_string(),
                message: "must be 1-64 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidCharacters {
                field: "queue_lane".to_string(),
                invalid_chars: "only ASCII alphanumeric, hyphens, and underscores".to_string(),
            });
        }

        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(ValidationError::InvalidFormat {
                field: "queue_lane".to_string(),
                message: "no leading/trailing hyphens or consecutive hyphens".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// The lane carrying geofence notification tasks
    pub fn geofence() -> Self {
        Self("geofence".to_string())
    }

    /// Get lane name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for QueueLane {
    fn default() -> Self {
        Self::geofence()
    }
}

impl fmt::Display for QueueLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueLane {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

// ============================================================================
// Task Types
// ============================================================================

/// Lifecycle state of a task.
///
/// `Pending → InProgress → {Succeeded | Pending (retry) | PermanentlyFailed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Succeeded,
    PermanentlyFailed,
}

impl TaskStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::PermanentlyFailed => "permanently_failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One canonical event wrapped with queue-management metadata.
///
/// Created when the normalizer accepts an event; mutated only by the queue
/// runtime (attempt increment and `last_error` on each retry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTask {
    pub task_id: TaskId,
    pub event: CanonicalEvent,
    pub lane: QueueLane,
    pub status: TaskStatus,
    /// Attempt counter, starting at 1 for the first delivery
    pub attempt: u32,
    pub enqueued_at: Timestamp,
    pub last_error: Option<String>,
}

impl NotificationTask {
    /// Wrap an event for its first delivery attempt
    pub fn new(event: CanonicalEvent, lane: QueueLane) -> Self {
        Self {
            task_id: TaskId::new(),
            event,
            lane,
            status: TaskStatus::Pending,
            attempt: 1,
            enqueued_at: Timestamp::now(),
            last_error: None,
        }
    }

    /// Record a failed attempt and prepare the retry
    pub fn into_retry(mut self, error: String) -> Self {
        self.attempt += 1;
        self.last_error = Some(error);
        self
    }
}

/// Terminal record for a task that exhausted its attempts.
///
/// This is the only path out of the queue that must stay externally
/// observable: operators replay from these records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTaskRecord {
    pub task: NotificationTask,
    pub attempts_made: u32,
    pub last_error: String,
    pub failed_at: Timestamp,
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
