//! # Notification Queue Module
//!
//! The explicit queue abstraction: an unbounded channel feeding a worker
//! pool, with retry scheduling owned entirely by the queue.
//!
//! Handlers report success or a typed [`TaskError`]; the queue decides
//! whether to re-schedule. Retry waits block only the individual task's
//! re-delivery (a detached timer), never a worker or the intake path.

use crate::error::QueueError;
use crate::retry::RetryPolicy;
use crate::task::{FailedTaskRecord, NotificationTask, QueueLane, TaskId, TaskStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use waypost_core::webhook::CanonicalEvent;
use waypost_core::{EventId, Timestamp};

// ============================================================================
// Handler Interface
// ============================================================================

/// Failure reported by a task handler.
///
/// `retryable` is the handler's claim that the failure is transient; the
/// queue still bounds retries by its [`RetryPolicy`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
    pub retryable: bool,
}

impl TaskError {
    /// A transient failure the queue should re-schedule
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A permanent failure that cannot succeed on retry
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Interface implemented by the consumer of queued events
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Process one canonical event.
    ///
    /// Must be idempotent: at-least-once delivery means the same event may
    /// be handed over more than once across redeliveries and retries.
    async fn handle(&self, event: &CanonicalEvent) -> Result<(), TaskError>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a notification queue instance
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Named partition for this workload
    pub lane: QueueLane,
    /// Number of parallel workers pulling from the lane
    pub workers: usize,
    /// Retry policy applied to transient handler failures
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lane: QueueLane::geofence(),
            workers: 4,
            retry: RetryPolicy::default(),
        }
    }
}

// ============================================================================
// NotificationQueue
// ============================================================================

struct QueueInner {
    config: QueueConfig,
    /// Intake sender; taken on shutdown so workers drain and exit
    tx: Mutex<Option<mpsc::UnboundedSender<NotificationTask>>>,
    /// Event ids currently queued, running, or waiting out a backoff.
    /// This is both the dedup key and the at-most-one-in-flight guard.
    in_flight: Mutex<HashMap<EventId, TaskId>>,
    /// Terminal failure records, retrievable for operator replay
    failed: Mutex<Vec<FailedTaskRecord>>,
    accepting: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// At-least-once task queue with a fixed-backoff retry state machine.
///
/// Cloning is cheap and shares the underlying queue.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

impl NotificationQueue {
    /// Start the queue and its worker pool.
    ///
    /// Workers run until [`Self::shutdown`] is called and the lane drains.
    pub fn start(config: QueueConfig, handler: Arc<dyn TaskHandler>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let inner = Arc::new(QueueInner {
            config,
            tx: Mutex::new(Some(tx)),
            in_flight: Mutex::new(HashMap::new()),
            failed: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
            workers: Mutex::new(Vec::new()),
        });

        let worker_count = inner.config.workers.max(1);
        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let inner = Arc::clone(&inner);
            let rx = Arc::clone(&rx);
            let handler = Arc::clone(&handler);
            handles.push(tokio::spawn(async move {
                Self::worker_loop(inner, rx, handler, worker_id).await;
            }));
        }
        *lock(&inner.workers) = handles;

        info!(
            lane = %inner.config.lane,
            workers = worker_count,
            "Notification queue started"
        );

        Self { inner }
    }

    /// Enqueue a canonical event for asynchronous processing.
    ///
    /// Returns immediately with the task id. A second `accept` for an event
    /// id that is already queued, running, or waiting out a backoff
    /// coalesces onto the existing task instead of duplicating it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ShuttingDown`] once [`Self::shutdown`] has
    /// begun.
    pub fn accept(&self, event: CanonicalEvent) -> Result<TaskId, QueueError> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(QueueError::ShuttingDown);
        }

        let event_id = event.event_id.clone();
        let mut in_flight = lock(&self.inner.in_flight);

        if let Some(existing) = in_flight.get(&event_id) {
            debug!(
                event_id = %event_id,
                task_id = %existing,
                "Duplicate accept coalesced onto in-flight task"
            );
            return Ok(*existing);
        }

        let task = NotificationTask::new(event, self.inner.config.lane.clone());
        let task_id = task.task_id;
        in_flight.insert(event_id.clone(), task_id);
        drop(in_flight);

        let sender = lock(&self.inner.tx).clone();
        match sender {
            Some(sender) if sender.send(task).is_ok() => {
                debug!(event_id = %event_id, task_id = %task_id, "Task enqueued");
                Ok(task_id)
            }
            _ => {
                lock(&self.inner.in_flight).remove(&event_id);
                Err(QueueError::ShuttingDown)
            }
        }
    }

    /// Terminal failure records accumulated so far
    pub fn failed_tasks(&self) -> Vec<FailedTaskRecord> {
        lock(&self.inner.failed).clone()
    }

    /// Number of event ids currently queued, running, or in backoff
    pub fn in_flight_count(&self) -> usize {
        lock(&self.inner.in_flight).len()
    }

    /// Stop intake and wait for workers to drain the lane.
    ///
    /// Tasks sleeping out a retry backoff when the queue closes are moved
    /// to the terminal failure records rather than silently dropped.
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        lock(&self.inner.tx).take();

        let handles: Vec<JoinHandle<()>> = lock(&self.inner.workers).drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        info!(lane = %self.inner.config.lane, "Notification queue stopped");
    }

    // ------------------------------------------------------------------------
    // Worker internals
    // ------------------------------------------------------------------------

    async fn worker_loop(
        inner: Arc<QueueInner>,
        rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<NotificationTask>>>,
        handler: Arc<dyn TaskHandler>,
        worker_id: usize,
    ) {
        loop {
            let task = { rx.lock().await.recv().await };
            let Some(task) = task else {
                break;
            };
            Self::run_task(&inner, handler.as_ref(), task, worker_id).await;
        }
        debug!(worker = worker_id, "Queue worker stopped");
    }

    async fn run_task(
        inner: &Arc<QueueInner>,
        handler: &dyn TaskHandler,
        mut task: NotificationTask,
        worker_id: usize,
    ) {
        task.status = TaskStatus::InProgress;
        let event_id = task.event.event_id.clone();

        debug!(
            worker = worker_id,
            task_id = %task.task_id,
            event_id = %event_id,
            attempt = task.attempt,
            "Processing task"
        );

        match handler.handle(&task.event).await {
            Ok(()) => {
                lock(&inner.in_flight).remove(&event_id);
                info!(
                    task_id = %task.task_id,
                    event_id = %event_id,
                    attempt = task.attempt,
                    "Task succeeded"
                );
            }
            Err(failure) if failure.retryable && inner.config.retry.should_retry(task.attempt) => {
                Self::schedule_retry(inner, task, failure);
            }
            Err(failure) => {
                Self::record_terminal_failure(inner, task, failure.message);
            }
        }
    }

    /// Re-enqueue a failed task after the backoff delay.
    ///
    /// The sleep runs in a detached timer task so the worker is free
    /// immediately; the event id stays claimed in `in_flight` for the whole
    /// backoff window, which is what keeps a redelivered duplicate from
    /// racing the retry.
    fn schedule_retry(inner: &Arc<QueueInner>, task: NotificationTask, failure: TaskError) {
        let delay = inner.config.retry.delay_for(task.attempt);

        warn!(
            task_id = %task.task_id,
            event_id = %task.event.event_id,
            attempt = task.attempt,
            max_attempts = inner.config.retry.max_attempts,
            delay_secs = delay.as_secs(),
            error = %failure,
            "Task failed, retry scheduled"
        );

        let mut retry = task.into_retry(failure.message);
        retry.status = TaskStatus::Pending;
        let inner = Arc::clone(inner);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let sender = lock(&inner.tx).clone();
            let retry = match sender {
                Some(sender) => match sender.send(retry) {
                    Ok(()) => return,
                    Err(send_error) => send_error.0,
                },
                None => retry,
            };

            // Queue closed while this task was in backoff
            Self::record_terminal_failure(
                &inner,
                retry,
                "queue shut down during retry backoff".to_string(),
            );
        });
    }

    fn record_terminal_failure(inner: &Arc<QueueInner>, mut task: NotificationTask, reason: String) {
        task.status = TaskStatus::PermanentlyFailed;
        let event_id = task.event.event_id.clone();
        lock(&inner.in_flight).remove(&event_id);

        error!(
            task_id = %task.task_id,
            event_id = %event_id,
            attempts_made = task.attempt,
            error = %reason,
            "Task permanently failed"
        );

        let record = FailedTaskRecord {
            attempts_made: task.attempt,
            last_error: reason,
            failed_at: Timestamp::now(),
            task,
        };
        lock(&inner.failed).push(record);
    }
}

/// Lock a std mutex, recovering from poisoning.
///
/// Queue state stays usable even if a worker panicked mid-update; the
/// records it guards are append-only or idempotently re-written.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
