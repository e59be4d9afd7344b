//! # Task Enqueuer
//!
//! Producer side of the task layer. Applies the scheduling policy of each
//! task type, serializes the payload, and hands the task to the broker.
//!
//! Broker failures are returned to the caller as-is and never retried here;
//! the caller decides whether to retry or fail its own request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::kinds::TaskKind;
use super::payloads::{
    AutoConfirmOrdersPayload, AutoProcessOrderPayload, PasswordResetEmailPayload,
    PharmacistAccountEmailPayload, VerificationEmailPayload,
};
use super::policy::{EnqueueOptions, TaskPolicies};
use crate::indexing::ProductDocument;
use crate::logging::log_task_operation;
use crate::messaging::{MessagingResult, NewTask, TaskBroker, TaskId};

#[derive(Clone)]
pub struct TaskEnqueuer {
    broker: Arc<dyn TaskBroker>,
    policies: TaskPolicies,
}

impl std::fmt::Debug for TaskEnqueuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEnqueuer")
            .field("broker", &self.broker.provider_name())
            .field("policies", &self.policies)
            .finish()
    }
}

impl TaskEnqueuer {
    pub fn new(broker: Arc<dyn TaskBroker>, policies: TaskPolicies) -> Self {
        Self { broker, policies }
    }

    pub fn policies(&self) -> &TaskPolicies {
        &self.policies
    }

    /// Enqueue with the task type's default policy
    pub async fn enqueue(&self, kind: TaskKind) -> MessagingResult<TaskId> {
        self.enqueue_with(kind, EnqueueOptions::default()).await
    }

    /// Enqueue with per-call overrides of the default policy
    pub async fn enqueue_with(
        &self,
        kind: TaskKind,
        options: EnqueueOptions,
    ) -> MessagingResult<TaskId> {
        let task_type = kind.task_type();
        let (delay, timeout, max_retries, queue) =
            options.resolve(self.policies.for_type(task_type));
        let payload = kind.encode()?;

        let result = self
            .broker
            .enqueue(NewTask {
                task_type: task_type.as_str().to_string(),
                payload,
                queue,
                delay,
                timeout,
                max_retries,
            })
            .await;

        match &result {
            Ok(task_id) => log_task_operation(
                "enqueue",
                Some(*task_id),
                task_type.as_str(),
                Some(queue.as_str()),
                None,
                "scheduled",
                Some(&format!("delay={}s", delay.as_secs())),
            ),
            Err(e) => tracing::error!(
                task_type = %task_type,
                queue = %queue,
                error = %e,
                "Failed to enqueue task"
            ),
        }

        result
    }

    pub async fn schedule_auto_process(&self, order_id: Uuid) -> MessagingResult<TaskId> {
        self.enqueue(TaskKind::AutoProcessOrder(AutoProcessOrderPayload { order_id }))
            .await
    }

    pub async fn schedule_auto_confirm(
        &self,
        order_ids: Vec<Uuid>,
        scheduled_at: DateTime<Utc>,
    ) -> MessagingResult<TaskId> {
        self.enqueue(TaskKind::AutoConfirmOrders(AutoConfirmOrdersPayload {
            order_ids,
            scheduled_at,
        }))
        .await
    }

    pub async fn send_verification_email(
        &self,
        payload: VerificationEmailPayload,
    ) -> MessagingResult<TaskId> {
        self.enqueue(TaskKind::SendVerificationEmail(payload)).await
    }

    pub async fn send_password_reset_email(
        &self,
        payload: PasswordResetEmailPayload,
    ) -> MessagingResult<TaskId> {
        self.enqueue(TaskKind::SendPasswordResetEmail(payload)).await
    }

    pub async fn send_pharmacist_account_email(
        &self,
        payload: PharmacistAccountEmailPayload,
    ) -> MessagingResult<TaskId> {
        self.enqueue(TaskKind::SendPharmacistAccountEmail(payload))
            .await
    }

    pub async fn index_new_product(&self, document: ProductDocument) -> MessagingResult<TaskId> {
        self.enqueue(TaskKind::CreateProduct(document)).await
    }

    pub async fn reindex_product(&self, document: ProductDocument) -> MessagingResult<TaskId> {
        self.enqueue(TaskKind::UpdateProduct(document)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{InMemoryTaskBroker, MessagingError, QueueClass};
    use std::time::Duration;

    fn enqueuer() -> (Arc<InMemoryTaskBroker>, TaskEnqueuer) {
        let broker = Arc::new(InMemoryTaskBroker::default());
        let enqueuer = TaskEnqueuer::new(broker.clone(), TaskPolicies::default());
        (broker, enqueuer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_process_uses_policy() {
        let (broker, enqueuer) = enqueuer();
        let order_id = Uuid::new_v4();
        enqueuer.schedule_auto_process(order_id).await.unwrap();

        let tasks = broker.snapshot();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_type, "order:auto_process");
        assert_eq!(tasks[0].queue, QueueClass::Critical);
        assert_eq!(tasks[0].max_retries, 20);
        assert_eq!(tasks[0].timeout, Duration::from_secs(25));
        assert_eq!(tasks[0].visible_in, Duration::from_secs(60));

        let decoded = TaskKind::decode(&tasks[0].task_type, &tasks[0].payload).unwrap();
        assert_eq!(
            decoded,
            TaskKind::AutoProcessOrder(AutoProcessOrderPayload { order_id })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_with_overrides() {
        let (broker, enqueuer) = enqueuer();
        enqueuer
            .enqueue_with(
                TaskKind::AutoProcessOrder(AutoProcessOrderPayload {
                    order_id: Uuid::new_v4(),
                }),
                EnqueueOptions::default()
                    .delay(Duration::from_secs(5))
                    .max_retries(3),
            )
            .await
            .unwrap();

        let tasks = broker.snapshot();
        assert_eq!(tasks[0].visible_in, Duration::from_secs(5));
        assert_eq!(tasks[0].max_retries, 3);
    }

    #[tokio::test]
    async fn test_broker_failure_is_returned_not_retried() {
        let (broker, enqueuer) = enqueuer();
        broker.set_available(false);

        let result = enqueuer.schedule_auto_process(Uuid::new_v4()).await;
        assert!(matches!(
            result,
            Err(MessagingError::BrokerUnavailable { .. })
        ));

        broker.set_available(true);
        assert!(broker.is_empty());
    }
}
