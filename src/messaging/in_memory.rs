//! # In-Memory Task Broker
//!
//! Thread-safe in-memory broker for tests, development, and the standalone
//! worker binary.
//!
//! ## Features
//!
//! - **Delayed Visibility**: tasks stay invisible until `enqueue + delay`
//! - **Leases**: a reserved task is invisible until `timeout + lease_grace`;
//!   an expired lease is redelivered (or dead-lettered on its last attempt)
//! - **Broker-Owned Retries**: attempt counters and backoff live here
//! - **Dead Letters**: exhausted and permanently failed tasks are kept for inspection
//!
//! Visibility uses `tokio::time::Instant`, so tests can drive it with a
//! paused clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::backoff::BackoffCalculator;
use super::broker::TaskBroker;
use super::errors::{MessagingError, MessagingResult};
use super::types::{
    DeadLetter, FailureDisposition, LeasedTask, NewTask, QueueClass, QueueStats, TaskId,
};

/// Saturation point for lease and retry instants (thirty years)
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Stored task with visibility tracking
#[derive(Debug, Clone)]
struct StoredTask {
    id: TaskId,
    /// Enqueue order, used as FIFO tie-breaker
    seq: u64,
    task_type: String,
    payload: Vec<u8>,
    queue: QueueClass,
    timeout: Duration,
    max_retries: u32,
    /// Deliveries so far
    attempt: u32,
    enqueued_at: DateTime<Utc>,
    visible_at: Instant,
    /// `Some` while leased by a worker
    lease_until: Option<Instant>,
    last_error: Option<String>,
}

impl StoredTask {
    fn is_ready(&self, now: Instant) -> bool {
        self.lease_until.is_none() && self.visible_at <= now
    }

    /// Whether the lease of delivery `attempt` is still the current one
    fn is_leased_by(&self, attempt: u32) -> bool {
        self.lease_until.is_some() && self.attempt == attempt
    }

    fn lease_expired(&self, now: Instant) -> bool {
        self.lease_until.is_some_and(|until| until <= now)
    }

    /// Instant at which this task next needs the broker's attention
    fn wake_at(&self) -> Instant {
        self.lease_until.unwrap_or(self.visible_at)
    }

    fn into_dead_letter(self, last_error: String) -> DeadLetter {
        DeadLetter {
            id: self.id,
            task_type: self.task_type,
            payload: self.payload,
            queue: self.queue,
            attempts: self.attempt,
            last_error,
            dead_lettered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    total_enqueued: AtomicU64,
    total_completed: AtomicU64,
    total_retried: AtomicU64,
    total_dead_lettered: AtomicU64,
}

#[derive(Debug, Default)]
struct BrokerState {
    tasks: HashMap<TaskId, StoredTask>,
    dead_letters: Vec<DeadLetter>,
}

/// Read-only view of a stored task, for tests and diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub task_type: String,
    pub payload: Vec<u8>,
    pub queue: QueueClass,
    pub attempt: u32,
    pub max_retries: u32,
    pub timeout: Duration,
    /// Zero when visible now
    pub visible_in: Duration,
    pub leased: bool,
}

#[derive(Debug)]
pub struct InMemoryTaskBroker {
    state: Mutex<BrokerState>,
    counters: HashMap<QueueClass, QueueCounters>,
    next_seq: AtomicU64,
    lease_grace: Duration,
    backoff: BackoffCalculator,
    notify: Arc<Notify>,
    available: AtomicBool,
}

impl Default for InMemoryTaskBroker {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), BackoffCalculator::default())
    }
}

impl InMemoryTaskBroker {
    pub fn new(lease_grace: Duration, backoff: BackoffCalculator) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            counters: QueueClass::ALL
                .into_iter()
                .map(|queue| (queue, QueueCounters::default()))
                .collect(),
            next_seq: AtomicU64::new(1),
            lease_grace,
            backoff,
            notify: Arc::new(Notify::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every call fails with `BrokerUnavailable` while false
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Snapshot of every stored task, oldest first
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        let now = Instant::now();
        let state = self.state.lock();
        let mut tasks: Vec<&StoredTask> = state.tasks.values().collect();
        tasks.sort_by_key(|task| task.seq);
        tasks
            .into_iter()
            .map(|task| TaskSnapshot {
                id: task.id,
                task_type: task.task_type.clone(),
                payload: task.payload.clone(),
                queue: task.queue,
                attempt: task.attempt,
                max_retries: task.max_retries,
                timeout: task.timeout,
                visible_in: task.visible_at.saturating_duration_since(now),
                leased: task.lease_until.is_some(),
            })
            .collect()
    }

    /// Number of stored tasks, leased or not
    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }

    fn check_available(&self, operation: &str) -> MessagingResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MessagingError::broker_unavailable(format!(
                "in-memory broker marked unavailable during {operation}"
            )))
        }
    }

    fn counters(&self, queue: QueueClass) -> MessagingResult<&QueueCounters> {
        self.counters
            .get(&queue)
            .ok_or_else(|| MessagingError::internal(format!("no counters for queue {queue}")))
    }

    /// Release expired leases of `queue`: redeliver, or dead-letter when the
    /// expired delivery was the last allowed attempt
    fn sweep_expired_leases(
        &self,
        state: &mut BrokerState,
        queue: QueueClass,
        now: Instant,
    ) -> MessagingResult<()> {
        let expired: Vec<TaskId> = state
            .tasks
            .values()
            .filter(|task| task.queue == queue && task.lease_expired(now))
            .map(|task| task.id)
            .collect();

        for task_id in expired {
            let Some(task) = state.tasks.get_mut(&task_id) else {
                continue;
            };

            if task.attempt >= task.max_retries {
                if let Some(task) = state.tasks.remove(&task_id) {
                    tracing::warn!(
                        task_id = %task_id,
                        task_type = %task.task_type,
                        queue = %queue,
                        attempt = task.attempt,
                        "Lease expired on final attempt, dead-lettering"
                    );
                    state
                        .dead_letters
                        .push(task.into_dead_letter("lease expired".to_string()));
                    self.counters(queue)?
                        .total_dead_lettered
                        .fetch_add(1, Ordering::Relaxed);
                }
            } else {
                tracing::warn!(
                    task_id = %task_id,
                    task_type = %task.task_type,
                    queue = %queue,
                    attempt = task.attempt,
                    "Lease expired, redelivering"
                );
                task.lease_until = None;
                task.visible_at = now;
                task.last_error = Some("lease expired".to_string());
                self.counters(queue)?
                    .total_retried
                    .fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TaskBroker for InMemoryTaskBroker {
    async fn enqueue(&self, task: NewTask) -> MessagingResult<TaskId> {
        self.check_available("enqueue")?;

        if task.max_retries == 0 {
            return Err(MessagingError::queue_operation(
                task.queue.as_str(),
                "enqueue",
                "max_retries must allow at least one attempt",
            ));
        }

        let now = Instant::now();
        let Some(visible_at) = now.checked_add(task.delay) else {
            return Err(MessagingError::queue_operation(
                task.queue.as_str(),
                "enqueue",
                format!("delay of {}s is out of range", task.delay.as_secs()),
            ));
        };
        let lease_fits = task
            .timeout
            .checked_add(self.lease_grace)
            .and_then(|lease| visible_at.checked_add(lease))
            .is_some();
        if !lease_fits {
            return Err(MessagingError::queue_operation(
                task.queue.as_str(),
                "enqueue",
                format!("timeout of {}s is out of range", task.timeout.as_secs()),
            ));
        }

        let id = TaskId::new();
        let stored = StoredTask {
            id,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            task_type: task.task_type,
            payload: task.payload,
            queue: task.queue,
            timeout: task.timeout,
            max_retries: task.max_retries,
            attempt: 0,
            enqueued_at: Utc::now(),
            visible_at,
            lease_until: None,
            last_error: None,
        };

        tracing::debug!(
            task_id = %id,
            task_type = %stored.task_type,
            queue = %stored.queue,
            delay_ms = u64::try_from(task.delay.as_millis()).unwrap_or(u64::MAX),
            "Task enqueued"
        );

        let queue = stored.queue;
        self.state.lock().tasks.insert(id, stored);
        self.counters(queue)?
            .total_enqueued
            .fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();

        Ok(id)
    }

    async fn reserve(&self, queue: QueueClass) -> MessagingResult<Option<LeasedTask>> {
        self.check_available("reserve")?;

        let now = Instant::now();
        let mut state = self.state.lock();
        self.sweep_expired_leases(&mut state, queue, now)?;

        let next = state
            .tasks
            .values()
            .filter(|task| task.queue == queue && task.is_ready(now))
            .min_by_key(|task| (task.visible_at, task.seq))
            .map(|task| task.id);

        let Some(task_id) = next else {
            return Ok(None);
        };
        let Some(task) = state.tasks.get_mut(&task_id) else {
            return Ok(None);
        };

        task.attempt += 1;
        task.lease_until = Some(instant_after(
            now,
            task.timeout.saturating_add(self.lease_grace),
        ));

        Ok(Some(LeasedTask {
            id: task.id,
            task_type: task.task_type.clone(),
            payload: task.payload.clone(),
            queue: task.queue,
            attempt: task.attempt,
            max_retries: task.max_retries,
            timeout: task.timeout,
            enqueued_at: task.enqueued_at,
        }))
    }

    async fn ack(&self, task_id: TaskId, attempt: u32) -> MessagingResult<()> {
        self.check_available("ack")?;

        let mut state = self.state.lock();
        match state.tasks.get(&task_id) {
            None => Err(MessagingError::task_not_found(task_id)),
            Some(task) if !task.is_leased_by(attempt) => Err(MessagingError::lease_lost(task_id)),
            Some(_) => {
                if let Some(task) = state.tasks.remove(&task_id) {
                    self.counters(task.queue)?
                        .total_completed
                        .fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            }
        }
    }

    async fn fail(
        &self,
        task_id: TaskId,
        attempt: u32,
        error: &str,
        retryable: bool,
    ) -> MessagingResult<FailureDisposition> {
        self.check_available("fail")?;

        let now = Instant::now();
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| MessagingError::task_not_found(task_id))?;
        if !task.is_leased_by(attempt) {
            return Err(MessagingError::lease_lost(task_id));
        }

        if retryable && task.attempt < task.max_retries {
            let retry_in = self.backoff.delay_for(task.attempt);
            task.lease_until = None;
            task.visible_at = instant_after(now, retry_in);
            task.last_error = Some(error.to_string());
            let disposition = FailureDisposition::Retrying {
                attempt: task.attempt,
                retry_in,
            };
            self.counters(task.queue)?
                .total_retried
                .fetch_add(1, Ordering::Relaxed);
            drop(state);
            self.notify.notify_one();
            return Ok(disposition);
        }

        let attempts = task.attempt;
        if let Some(task) = state.tasks.remove(&task_id) {
            let queue = task.queue;
            state
                .dead_letters
                .push(task.into_dead_letter(error.to_string()));
            self.counters(queue)?
                .total_dead_lettered
                .fetch_add(1, Ordering::Relaxed);
        }

        Ok(FailureDisposition::DeadLettered { attempts })
    }

    async fn next_ready_in(&self) -> MessagingResult<Option<Duration>> {
        self.check_available("next_ready_in")?;

        let now = Instant::now();
        let state = self.state.lock();
        Ok(state
            .tasks
            .values()
            .map(StoredTask::wake_at)
            .min()
            .map(|at| at.saturating_duration_since(now)))
    }

    fn enqueue_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    async fn queue_stats(&self, queue: QueueClass) -> MessagingResult<QueueStats> {
        self.check_available("queue_stats")?;

        let now = Instant::now();
        let counters = self.counters(queue)?;
        let state = self.state.lock();

        let mut stats = QueueStats {
            queue: Some(queue),
            total_enqueued: counters.total_enqueued.load(Ordering::Relaxed),
            total_completed: counters.total_completed.load(Ordering::Relaxed),
            total_retried: counters.total_retried.load(Ordering::Relaxed),
            total_dead_lettered: counters.total_dead_lettered.load(Ordering::Relaxed),
            ..QueueStats::default()
        };

        for task in state.tasks.values().filter(|task| task.queue == queue) {
            if task.lease_until.is_some() {
                stats.in_flight += 1;
            } else if task.visible_at <= now {
                stats.ready += 1;
            } else {
                stats.scheduled += 1;
            }
        }

        Ok(stats)
    }

    async fn dead_letters(&self) -> MessagingResult<Vec<DeadLetter>> {
        self.check_available("dead_letters")?;
        Ok(self.state.lock().dead_letters.clone())
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

/// `now + after`, saturating at a far-future instant instead of overflowing
fn instant_after(now: Instant, after: Duration) -> Instant {
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffConfig;

    fn broker() -> InMemoryTaskBroker {
        InMemoryTaskBroker::new(
            Duration::from_secs(2),
            BackoffCalculator::new(BackoffConfig {
                base_delay_seconds: 1.0,
                max_delay_seconds: 30.0,
                multiplier: 2.0,
                jitter_enabled: false,
                max_jitter: 0.0,
            }),
        )
    }

    fn new_task(queue: QueueClass, delay: Duration, max_retries: u32) -> NewTask {
        NewTask {
            task_type: "email:verification".to_string(),
            payload: b"{}".to_vec(),
            queue,
            delay,
            timeout: Duration::from_secs(5),
            max_retries,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_task_is_invisible_until_due() {
        let broker = broker();
        broker
            .enqueue(new_task(QueueClass::Critical, Duration::from_secs(60), 3))
            .await
            .unwrap();

        assert!(broker.reserve(QueueClass::Critical).await.unwrap().is_none());
        assert_eq!(
            broker.next_ready_in().await.unwrap(),
            Some(Duration::from_secs(60))
        );

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(broker.reserve(QueueClass::Critical).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(1)).await;
        let leased = broker.reserve(QueueClass::Critical).await.unwrap().unwrap();
        assert_eq!(leased.attempt, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_only_reads_requested_queue() {
        let broker = broker();
        broker
            .enqueue(new_task(QueueClass::Low, Duration::ZERO, 3))
            .await
            .unwrap();

        assert!(broker.reserve(QueueClass::Critical).await.unwrap().is_none());
        assert!(broker.reserve(QueueClass::Low).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_within_queue() {
        let broker = broker();
        let first = broker
            .enqueue(new_task(QueueClass::Default, Duration::ZERO, 3))
            .await
            .unwrap();
        let second = broker
            .enqueue(new_task(QueueClass::Default, Duration::ZERO, 3))
            .await
            .unwrap();

        assert_eq!(
            broker.reserve(QueueClass::Default).await.unwrap().unwrap().id,
            first
        );
        assert_eq!(
            broker.reserve(QueueClass::Default).await.unwrap().unwrap().id,
            second
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_uses_backoff_then_dead_letters() {
        let broker = broker();
        let id = broker
            .enqueue(new_task(QueueClass::Default, Duration::ZERO, 2))
            .await
            .unwrap();

        broker.reserve(QueueClass::Default).await.unwrap().unwrap();
        let disposition = broker.fail(id, 1, "smtp 421", true).await.unwrap();
        assert_eq!(
            disposition,
            FailureDisposition::Retrying {
                attempt: 1,
                retry_in: Duration::from_secs(1)
            }
        );
        assert!(broker.reserve(QueueClass::Default).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(1)).await;
        let leased = broker.reserve(QueueClass::Default).await.unwrap().unwrap();
        assert_eq!(leased.attempt, 2);
        assert!(leased.is_last_attempt());

        let disposition = broker.fail(id, 2, "smtp 421", true).await.unwrap();
        assert_eq!(disposition, FailureDisposition::DeadLettered { attempts: 2 });
        assert!(broker.is_empty());

        let dead = broker.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
        assert_eq!(dead[0].last_error, "smtp 421");
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_dead_letters_immediately() {
        let broker = broker();
        let id = broker
            .enqueue(new_task(QueueClass::Default, Duration::ZERO, 10))
            .await
            .unwrap();
        broker.reserve(QueueClass::Default).await.unwrap().unwrap();

        let disposition = broker.fail(id, 1, "bad payload", false).await.unwrap();
        assert_eq!(disposition, FailureDisposition::DeadLettered { attempts: 1 });

        let stats = broker.queue_stats(QueueClass::Default).await.unwrap();
        assert_eq!(stats.total_dead_lettered, 1);
        assert_eq!(stats.total_retried, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_is_redelivered() {
        let broker = broker();
        broker
            .enqueue(new_task(QueueClass::Critical, Duration::ZERO, 3))
            .await
            .unwrap();

        let first = broker.reserve(QueueClass::Critical).await.unwrap().unwrap();
        assert!(broker.reserve(QueueClass::Critical).await.unwrap().is_none());
        assert_eq!(
            broker.next_ready_in().await.unwrap(),
            Some(Duration::from_secs(7))
        );

        // timeout 5s + grace 2s
        tokio::time::advance(Duration::from_secs(7)).await;
        let second = broker.reserve(QueueClass::Critical).await.unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_delivery_cannot_ack_or_fail() {
        let broker = broker();
        let id = broker
            .enqueue(new_task(QueueClass::Critical, Duration::ZERO, 3))
            .await
            .unwrap();
        let first = broker.reserve(QueueClass::Critical).await.unwrap().unwrap();

        tokio::time::advance(Duration::from_secs(7)).await;
        let second = broker.reserve(QueueClass::Critical).await.unwrap().unwrap();
        assert_eq!(second.attempt, 2);

        // The first holder finishes late; the redelivered run keeps its lease
        assert!(matches!(
            broker.ack(id, first.attempt).await,
            Err(MessagingError::LeaseLost { .. })
        ));
        assert!(matches!(
            broker.fail(id, first.attempt, "late", true).await,
            Err(MessagingError::LeaseLost { .. })
        ));
        assert_eq!(broker.len(), 1);
        assert!(broker.snapshot()[0].leased);

        broker.ack(id, second.attempt).await.unwrap();
        assert!(broker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_durations_rejected_at_enqueue() {
        let broker = broker();

        let mut endless_timeout = new_task(QueueClass::Critical, Duration::ZERO, 3);
        endless_timeout.timeout = Duration::from_secs(i64::MAX as u64);
        assert!(matches!(
            broker.enqueue(endless_timeout).await,
            Err(MessagingError::QueueOperation { .. })
        ));

        let endless_delay = new_task(QueueClass::Critical, Duration::MAX, 3);
        assert!(matches!(
            broker.enqueue(endless_delay).await,
            Err(MessagingError::QueueOperation { .. })
        ));

        assert!(broker.is_empty());
        assert!(broker.reserve(QueueClass::Critical).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_on_last_attempt_dead_letters() {
        let broker = broker();
        broker
            .enqueue(new_task(QueueClass::Critical, Duration::ZERO, 1))
            .await
            .unwrap();
        broker.reserve(QueueClass::Critical).await.unwrap().unwrap();

        tokio::time::advance(Duration::from_secs(7)).await;
        assert!(broker.reserve(QueueClass::Critical).await.unwrap().is_none());
        assert_eq!(broker.dead_letters().await.unwrap().len(), 1);
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_ack_removes_task() {
        let broker = broker();
        let id = broker
            .enqueue(new_task(QueueClass::Low, Duration::ZERO, 3))
            .await
            .unwrap();

        assert!(matches!(
            broker.ack(id, 0).await,
            Err(MessagingError::LeaseLost { .. })
        ));

        broker.reserve(QueueClass::Low).await.unwrap().unwrap();
        broker.ack(id, 1).await.unwrap();
        assert!(broker.is_empty());
        assert!(matches!(
            broker.ack(id, 1).await,
            Err(MessagingError::TaskNotFound { .. })
        ));

        let stats = broker.queue_stats(QueueClass::Low).await.unwrap();
        assert_eq!(stats.total_enqueued, 1);
        assert_eq!(stats.total_completed, 1);
    }

    #[tokio::test]
    async fn test_unavailable_broker_rejects_enqueue() {
        let broker = broker();
        broker.set_available(false);
        let result = broker
            .enqueue(new_task(QueueClass::Critical, Duration::ZERO, 3))
            .await;
        assert!(matches!(
            result,
            Err(MessagingError::BrokerUnavailable { .. })
        ));
        assert!(!broker.health_check().await.unwrap());
    }
}
