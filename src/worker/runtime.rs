//! # Worker Runtime
//!
//! Wires a broker, its producer side and a started [`WorkerPool`] from one
//! [`OrderflowConfig`]. The broker is supplied by the embedding code, so the
//! same instance backs both the [`TaskEnqueuer`] handed to services and the
//! pool draining it.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::OrderflowConfig;
use crate::errors::WorkerError;
use crate::messaging::TaskBroker;
use crate::tasks::TaskEnqueuer;

use super::pool::{WorkerPool, WorkerPoolConfig, WorkerPoolHandle, WorkerStatsSnapshot};
use super::router::TaskRouter;

#[derive(Debug)]
pub struct WorkerRuntime {
    tasks: TaskEnqueuer,
    handle: WorkerPoolHandle,
    shutdown_grace: Duration,
}

impl WorkerRuntime {
    /// Validate the pool settings and start draining `broker`
    pub fn start(
        config: &OrderflowConfig,
        broker: Arc<dyn TaskBroker>,
        router: Arc<TaskRouter>,
    ) -> Result<Self, WorkerError> {
        let pool_config = WorkerPoolConfig::from(&config.worker);
        let shutdown_grace = pool_config.shutdown_grace;
        let tasks = TaskEnqueuer::new(broker.clone(), config.tasks.clone());
        let handle = WorkerPool::new(broker, router, pool_config)?.start();

        info!(
            concurrency = config.worker.concurrency,
            grace_seconds = shutdown_grace.as_secs(),
            "Worker runtime started"
        );
        Ok(Self {
            tasks,
            handle,
            shutdown_grace,
        })
    }

    /// Producer side of the broker this runtime drains
    pub fn tasks(&self) -> &TaskEnqueuer {
        &self.tasks
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.handle.stats()
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// Drain with the configured grace period
    pub async fn shutdown(self) -> Result<WorkerStatsSnapshot, WorkerError> {
        self.handle.shutdown(self.shutdown_grace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::InMemoryProductIndex;
    use crate::messaging::{BackoffCalculator, InMemoryTaskBroker};
    use crate::notification::{InMemoryNotifier, MailTemplate};
    use crate::store::InMemoryOrderStore;
    use crate::tasks::VerificationEmailPayload;

    #[tokio::test(start_paused = true)]
    async fn test_enqueued_tasks_reach_the_runtime_pool() {
        let config = OrderflowConfig::default();
        let broker = Arc::new(InMemoryTaskBroker::new(
            config.broker.lease_grace(),
            BackoffCalculator::new(config.backoff.clone()),
        ));
        let notifier = Arc::new(InMemoryNotifier::new());
        let router = Arc::new(TaskRouter::with_collaborators(
            Arc::new(InMemoryOrderStore::new()),
            notifier.clone(),
            Arc::new(InMemoryProductIndex::new()),
        ));
        let runtime = WorkerRuntime::start(&config, broker.clone(), router).unwrap();

        runtime
            .tasks()
            .send_verification_email(VerificationEmailPayload {
                email: "user@example.com".to_string(),
                name: "User".to_string(),
                verification_link: "https://example.com/verify/1".to_string(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, MailTemplate::Verification);
        assert!(broker.is_empty());

        let stats = runtime.shutdown().await.unwrap();
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn test_invalid_pool_settings_are_rejected() {
        let mut config = OrderflowConfig::default();
        config.worker.concurrency = 0;
        let router = Arc::new(TaskRouter::with_collaborators(
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(InMemoryNotifier::new()),
            Arc::new(InMemoryProductIndex::new()),
        ));
        let result = WorkerRuntime::start(
            &config,
            Arc::new(InMemoryTaskBroker::default()),
            router,
        );
        assert!(matches!(result, Err(WorkerError::Configuration(_))));
    }
}
