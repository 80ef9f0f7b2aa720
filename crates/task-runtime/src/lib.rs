//! # Task Runtime
//!
//! Durable, retryable, at-least-once task queue for Waypost notification
//! processing.
//!
//! The queue is an explicit abstraction — an unbounded channel feeding a
//! worker pool — with attempt and backoff state carried on each task rather
//! than on ambient framework state. The queue is the sole authority on
//! attempt counts: handlers only report success or a typed failure, and the
//! queue decides whether to re-schedule.
//!
//! ## Guarantees
//!
//! - `accept` returns immediately; the webhook ingress path never blocks on
//!   processing.
//! - Tasks sharing an event id are processed with at-most-one-in-flight
//!   semantics; a duplicate `accept` while the first task is queued or
//!   running coalesces onto the existing task.
//! - A task that exhausts its attempts is moved to a permanently-failed
//!   record for operator replay — it is never silently dropped.

pub mod error;
pub mod queue;
pub mod retry;
pub mod task;

pub use error::QueueError;
pub use queue::{NotificationQueue, QueueConfig, TaskError, TaskHandler};
pub use retry::RetryPolicy;
pub use task::{FailedTaskRecord, NotificationTask, QueueLane, TaskId, TaskStatus};
