//! # Worker Pool
//!
//! Fetch loop plus bounded handler execution.
//!
//! The loop acquires a concurrency permit before reserving a task, so the
//! broker never leases more tasks than can run. Each reserved task runs in
//! its own spawned future under the task's timeout with panic capture;
//! the outcome is reported back to the broker as ack or fail.
//!
//! Shutdown stops fetching, then waits up to a grace period for in-flight
//! handlers. Handlers still running after the grace period are aborted
//! without ack; their leases expire and the broker redelivers them.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::router::{HandlerOutcome, TaskRouter};
use super::scheduler::WeightedQueueSelector;
use crate::config::{ConfigurationError, QueueWeights, WorkerConfig};
use crate::errors::WorkerError;
use crate::logging::log_task_operation;
use crate::messaging::{
    FailureDisposition, LeasedTask, MessagingResult, QueueClass, TaskBroker,
};

const SHUTDOWN_CHANNEL_CAPACITY: usize = 16;

/// Runtime settings of a [`WorkerPool`]
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerPoolConfig {
    pub concurrency: usize,
    pub queue_weights: QueueWeights,
    /// Idle wait when the broker gives no wake-up hint, and back-off after broker errors
    pub poll_interval: Duration,
    pub max_idle_wait: Duration,
    /// Drain period used by [`WorkerPool::run`]
    pub shutdown_grace: Duration,
}

impl From<&WorkerConfig> for WorkerPoolConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            queue_weights: config.queue_weights,
            poll_interval: config.poll_interval(),
            max_idle_wait: config.max_idle_wait(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

/// Live counters of a running pool
#[derive(Debug, Default)]
pub struct WorkerStats {
    dispatched_critical: AtomicU64,
    dispatched_default: AtomicU64,
    dispatched_low: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    timed_out: AtomicU64,
    panicked: AtomicU64,
    broker_errors: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    pub dispatched_critical: u64,
    pub dispatched_default: u64,
    pub dispatched_low: u64,
    pub completed: u64,
    pub skipped: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub timed_out: u64,
    pub panicked: u64,
    pub broker_errors: u64,
}

impl WorkerStatsSnapshot {
    pub fn dispatched(&self, queue: QueueClass) -> u64 {
        match queue {
            QueueClass::Critical => self.dispatched_critical,
            QueueClass::Default => self.dispatched_default,
            QueueClass::Low => self.dispatched_low,
        }
    }

    pub fn total_dispatched(&self) -> u64 {
        self.dispatched_critical + self.dispatched_default + self.dispatched_low
    }
}

impl WorkerStats {
    fn record_dispatch(&self, queue: QueueClass) {
        let counter = match queue {
            QueueClass::Critical => &self.dispatched_critical,
            QueueClass::Default => &self.dispatched_default,
            QueueClass::Low => &self.dispatched_low,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        WorkerStatsSnapshot {
            dispatched_critical: load(&self.dispatched_critical),
            dispatched_default: load(&self.dispatched_default),
            dispatched_low: load(&self.dispatched_low),
            completed: load(&self.completed),
            skipped: load(&self.skipped),
            retried: load(&self.retried),
            dead_lettered: load(&self.dead_lettered),
            timed_out: load(&self.timed_out),
            panicked: load(&self.panicked),
            broker_errors: load(&self.broker_errors),
        }
    }
}

pub struct WorkerPool {
    broker: Arc<dyn TaskBroker>,
    router: Arc<TaskRouter>,
    config: WorkerPoolConfig,
    stats: Arc<WorkerStats>,
    drain_grace_ms: Arc<AtomicU64>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("broker", &self.broker.provider_name())
            .field("router", &self.router)
            .field("config", &self.config)
            .finish()
    }
}

impl WorkerPool {
    pub fn new(
        broker: Arc<dyn TaskBroker>,
        router: Arc<TaskRouter>,
        config: WorkerPoolConfig,
    ) -> Result<Self, WorkerError> {
        if config.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.concurrency",
                config.concurrency,
                "must be at least 1",
            )
            .into());
        }
        for queue in QueueClass::ALL {
            let weight = config.queue_weights.weight(queue);
            if weight == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("worker.queue_weights.{queue}"),
                    weight,
                    "every queue class needs a positive weight",
                )
                .into());
            }
        }

        let drain_grace_ms = Arc::new(AtomicU64::new(duration_millis(config.shutdown_grace)));
        Ok(Self {
            broker,
            router,
            config,
            stats: Arc::new(WorkerStats::default()),
            drain_grace_ms,
        })
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Spawn the pool onto the runtime
    pub fn start(self) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(SHUTDOWN_CHANNEL_CAPACITY);
        let stats = self.stats.clone();
        let drain_grace_ms = self.drain_grace_ms.clone();
        let join = tokio::spawn(self.run(shutdown_rx));
        WorkerPoolHandle {
            shutdown_tx,
            join,
            stats,
            drain_grace_ms,
        }
    }

    /// Run until a shutdown signal arrives, then drain
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), WorkerError> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let wake = self.broker.enqueue_notifier();
        let mut selector = WeightedQueueSelector::new(self.config.queue_weights);
        let mut in_flight: JoinSet<()> = JoinSet::new();

        info!(
            broker = self.broker.provider_name(),
            concurrency = self.config.concurrency,
            critical_weight = self.config.queue_weights.critical,
            default_weight = self.config.queue_weights.default,
            low_weight = self.config.queue_weights.low,
            "Worker pool started"
        );

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                log_join_result(joined);
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                permit = semaphore.clone().acquire_owned() => {
                    permit.map_err(|e| WorkerError::Supervisor {
                        message: format!("concurrency semaphore closed: {e}"),
                    })?
                }
            };

            match self.reserve_next(&mut selector).await {
                Ok(Some(task)) => {
                    self.stats.record_dispatch(task.queue);
                    log_task_operation(
                        "dispatch",
                        Some(task.id),
                        &task.task_type,
                        Some(task.queue.as_str()),
                        Some(task.attempt),
                        "running",
                        None,
                    );
                    let execution = TaskExecution {
                        broker: self.broker.clone(),
                        router: self.router.clone(),
                        stats: self.stats.clone(),
                    };
                    in_flight.spawn(execution.run(task, permit));
                }
                Ok(None) => {
                    drop(permit);
                    let wait = self.idle_wait().await;
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => break,
                        _ = wake.notified() => {}
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    WorkerStats::bump(&self.stats.broker_errors);
                    warn!(
                        error = %e,
                        retry_in_ms = duration_millis(self.config.poll_interval),
                        "Failed to reserve task from broker"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        self.drain(in_flight).await;

        info!(stats = ?self.stats.snapshot(), "Worker pool stopped");
        Ok(())
    }

    /// Try the weighted pick first, then fall back to the other classes
    async fn reserve_next(
        &self,
        selector: &mut WeightedQueueSelector,
    ) -> MessagingResult<Option<LeasedTask>> {
        for queue in selector.next_order() {
            if let Some(task) = self.broker.reserve(queue).await? {
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    async fn idle_wait(&self) -> Duration {
        let hint = match self.broker.next_ready_in().await {
            Ok(Some(until_ready)) => until_ready,
            Ok(None) => self.config.poll_interval,
            Err(e) => {
                debug!(error = %e, "No wake-up hint from broker");
                self.config.poll_interval
            }
        };
        hint.min(self.config.max_idle_wait)
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        let grace = Duration::from_millis(self.drain_grace_ms.load(Ordering::SeqCst));
        info!(
            in_flight = in_flight.len(),
            grace_ms = duration_millis(grace),
            "Shutdown requested, draining in-flight handlers"
        );

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = in_flight.join_next().await {
                log_join_result(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                aborted = in_flight.len(),
                "Shutdown grace elapsed, aborting remaining handlers; their leases will expire"
            );
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
        }
    }
}

/// Handle to a pool started with [`WorkerPool::start`]
#[derive(Debug)]
pub struct WorkerPoolHandle {
    shutdown_tx: broadcast::Sender<()>,
    join: JoinHandle<Result<(), WorkerError>>,
    stats: Arc<WorkerStats>,
    drain_grace_ms: Arc<AtomicU64>,
}

impl WorkerPoolHandle {
    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop fetching, wait up to `grace` for in-flight handlers, abort the rest
    pub async fn shutdown(self, grace: Duration) -> Result<WorkerStatsSnapshot, WorkerError> {
        self.drain_grace_ms
            .store(duration_millis(grace), Ordering::SeqCst);
        // No receiver means the pool loop already exited
        let _ = self.shutdown_tx.send(());

        match self.join.await {
            Ok(Ok(())) => Ok(self.stats.snapshot()),
            Ok(Err(e)) => Err(e),
            Err(join_error) => Err(WorkerError::Supervisor {
                message: format!("worker pool task failed: {join_error}"),
            }),
        }
    }
}

/// Everything a spawned handler execution needs
struct TaskExecution {
    broker: Arc<dyn TaskBroker>,
    router: Arc<TaskRouter>,
    stats: Arc<WorkerStats>,
}

impl TaskExecution {
    async fn run(self, task: LeasedTask, permit: OwnedSemaphorePermit) {
        let started = Instant::now();
        let result = tokio::time::timeout(
            task.timeout,
            AssertUnwindSafe(self.router.dispatch(&task)).catch_unwind(),
        )
        .await;
        // Free the slot before talking to the broker
        drop(permit);
        let elapsed_ms = duration_millis(started.elapsed());

        match result {
            Ok(Ok(Ok(outcome))) => self.complete(&task, outcome, elapsed_ms).await,
            Ok(Ok(Err(handler_error))) => {
                self.report_failure(&task, &handler_error.to_string(), handler_error.is_retryable())
                    .await;
            }
            Ok(Err(panic)) => {
                WorkerStats::bump(&self.stats.panicked);
                let message = panic_message(panic.as_ref());
                error!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    attempt = task.attempt,
                    panic = %message,
                    "Task handler panicked"
                );
                self.report_failure(&task, &format!("handler panicked: {message}"), true)
                    .await;
            }
            Err(_) => {
                WorkerStats::bump(&self.stats.timed_out);
                warn!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    attempt = task.attempt,
                    timeout_ms = duration_millis(task.timeout),
                    "Task handler timed out"
                );
                self.report_failure(
                    &task,
                    &format!("handler exceeded timeout of {}ms", duration_millis(task.timeout)),
                    true,
                )
                .await;
            }
        }
    }

    async fn complete(&self, task: &LeasedTask, outcome: HandlerOutcome, elapsed_ms: u64) {
        let (status, details) = match &outcome {
            HandlerOutcome::Completed => {
                WorkerStats::bump(&self.stats.completed);
                ("completed", format!("elapsed_ms={elapsed_ms}"))
            }
            HandlerOutcome::Skipped { reason } => {
                WorkerStats::bump(&self.stats.skipped);
                ("skipped", reason.clone())
            }
        };

        if let Err(e) = self.broker.ack(task.id, task.attempt).await {
            WorkerStats::bump(&self.stats.broker_errors);
            warn!(
                task_id = %task.id,
                error = %e,
                "Failed to ack task; it may be delivered again"
            );
            return;
        }

        log_task_operation(
            "ack",
            Some(task.id),
            &task.task_type,
            Some(task.queue.as_str()),
            Some(task.attempt),
            status,
            Some(&details),
        );
    }

    async fn report_failure(&self, task: &LeasedTask, message: &str, retryable: bool) {
        match self.broker.fail(task.id, task.attempt, message, retryable).await {
            Ok(FailureDisposition::Retrying { attempt, retry_in }) => {
                WorkerStats::bump(&self.stats.retried);
                warn!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    failed_attempt = attempt,
                    max_retries = task.max_retries,
                    retry_in_ms = duration_millis(retry_in),
                    error = %message,
                    "Task failed, retry scheduled"
                );
            }
            Ok(FailureDisposition::DeadLettered { attempts }) => {
                WorkerStats::bump(&self.stats.dead_lettered);
                error!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    queue = %task.queue,
                    attempts = attempts,
                    retryable = retryable,
                    error = %message,
                    "Task dead-lettered"
                );
            }
            Err(e) => {
                WorkerStats::bump(&self.stats.broker_errors);
                warn!(
                    task_id = %task.id,
                    error = %e,
                    handler_error = %message,
                    "Failed to report task failure; lease expiry will redeliver it"
                );
            }
        }
    }
}

fn log_join_result(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if !e.is_cancelled() {
            error!(error = %e, "Handler execution task failed");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
