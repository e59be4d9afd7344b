use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::errors::MessagingResult;
use super::types::{DeadLetter, FailureDisposition, LeasedTask, NewTask, QueueClass, QueueStats, TaskId};

/// Queue storage for deferred tasks
///
/// Implementations own every scheduling decision after enqueue: when a task
/// becomes visible, how long a lease lasts, whether a failure is retried and
/// after what delay, and when a task is dead-lettered.
#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Store a task, invisible until its delay elapses
    async fn enqueue(&self, task: NewTask) -> MessagingResult<TaskId>;

    /// Lease the next ready task of `queue`, if any
    ///
    /// Increments the task's attempt counter.
    async fn reserve(&self, queue: QueueClass) -> MessagingResult<Option<LeasedTask>>;

    /// Complete a leased task; it is removed for good
    ///
    /// `attempt` identifies the lease. A holder whose lease expired and was
    /// handed to another delivery gets `LeaseLost`.
    async fn ack(&self, task_id: TaskId, attempt: u32) -> MessagingResult<()>;

    /// Report a failed attempt
    ///
    /// Retryable failures are requeued with backoff while attempts remain;
    /// everything else is dead-lettered. `attempt` identifies the lease as
    /// for [`TaskBroker::ack`].
    async fn fail(
        &self,
        task_id: TaskId,
        attempt: u32,
        error: &str,
        retryable: bool,
    ) -> MessagingResult<FailureDisposition>;

    /// Time until the earliest scheduled task or lease expiry, `Some(ZERO)`
    /// when something is ready now, `None` when nothing is pending
    async fn next_ready_in(&self) -> MessagingResult<Option<Duration>>;

    /// Signalled whenever a task is enqueued or requeued
    fn enqueue_notifier(&self) -> Arc<Notify>;

    async fn queue_stats(&self, queue: QueueClass) -> MessagingResult<QueueStats>;

    async fn dead_letters(&self) -> MessagingResult<Vec<DeadLetter>>;

    async fn health_check(&self) -> MessagingResult<bool>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
