//! Account mail and catalog index orchestration
//!
//! Account flows (registration, password reset, pharmacist onboarding) and
//! catalog writes never wait for mail delivery or indexing; they validate
//! what they can up front and hand the rest to the task queue.

use tracing::debug;

use crate::errors::NotificationError;
use crate::indexing::ProductDocument;
use crate::messaging::TaskId;
use crate::tasks::payloads::validate_recipient;
use crate::tasks::{
    PasswordResetEmailPayload, PharmacistAccountEmailPayload, TaskEnqueuer,
    VerificationEmailPayload,
};

#[derive(Debug, Clone)]
pub struct NotificationService {
    tasks: TaskEnqueuer,
}

impl NotificationService {
    pub fn new(tasks: TaskEnqueuer) -> Self {
        Self { tasks }
    }

    pub async fn user_registered(
        &self,
        email: &str,
        name: &str,
        verification_link: &str,
    ) -> Result<TaskId, NotificationError> {
        validate_recipient(email).map_err(NotificationError::permanent)?;
        let task_id = self
            .tasks
            .send_verification_email(VerificationEmailPayload {
                email: email.trim().to_string(),
                name: name.to_string(),
                verification_link: verification_link.to_string(),
            })
            .await?;
        Ok(task_id)
    }

    pub async fn password_reset_requested(
        &self,
        email: &str,
        name: &str,
        reset_link: &str,
    ) -> Result<TaskId, NotificationError> {
        validate_recipient(email).map_err(NotificationError::permanent)?;
        let task_id = self
            .tasks
            .send_password_reset_email(PasswordResetEmailPayload {
                email: email.trim().to_string(),
                name: name.to_string(),
                reset_link: reset_link.to_string(),
            })
            .await?;
        Ok(task_id)
    }

    pub async fn pharmacist_account_created(
        &self,
        email: &str,
        name: &str,
        pharmacy_name: &str,
        setup_link: &str,
    ) -> Result<TaskId, NotificationError> {
        validate_recipient(email).map_err(NotificationError::permanent)?;
        let task_id = self
            .tasks
            .send_pharmacist_account_email(PharmacistAccountEmailPayload {
                email: email.trim().to_string(),
                name: name.to_string(),
                pharmacy_name: pharmacy_name.to_string(),
                setup_link: setup_link.to_string(),
            })
            .await?;
        Ok(task_id)
    }

    /// Queue an index write for a created (`is_new`) or edited product
    pub async fn product_saved(
        &self,
        document: ProductDocument,
        is_new: bool,
    ) -> Result<TaskId, NotificationError> {
        if document.name.trim().is_empty() {
            return Err(NotificationError::permanent(format!(
                "product {} has no name to index",
                document.product_id
            )));
        }

        let product_id = document.product_id;
        let task_id = if is_new {
            self.tasks.index_new_product(document).await?
        } else {
            self.tasks.reindex_product(document).await?
        };
        debug!(product_id = %product_id, is_new = is_new, task_id = %task_id, "Product index update queued");
        Ok(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{InMemoryTaskBroker, QueueClass};
    use crate::tasks::{TaskPolicies, TaskType};
    use std::sync::Arc;
    use uuid::Uuid;

    fn service() -> (Arc<InMemoryTaskBroker>, NotificationService) {
        let broker = Arc::new(InMemoryTaskBroker::default());
        let tasks = TaskEnqueuer::new(broker.clone(), TaskPolicies::default());
        (broker, NotificationService::new(tasks))
    }

    #[tokio::test]
    async fn test_registration_queues_verification_email() {
        let (broker, service) = service();
        service
            .user_registered(" rina@example.com ", "Rina", "https://example.com/v/1")
            .await
            .unwrap();

        let snapshot = broker.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].task_type, TaskType::SendVerificationEmail.as_str());
        assert_eq!(snapshot[0].queue, QueueClass::Default);
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected_before_enqueue() {
        let (broker, service) = service();
        let result = service
            .password_reset_requested("rina", "Rina", "https://example.com/r/1")
            .await;
        assert!(matches!(result, Err(NotificationError::Permanent { .. })));
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_broker_outage_is_transient() {
        let (broker, service) = service();
        broker.set_available(false);
        let result = service
            .pharmacist_account_created(
                "apt@example.com",
                "Apoteker",
                "Apotek Sehat",
                "https://example.com/setup/1",
            )
            .await;
        assert!(matches!(result, Err(NotificationError::Transient { .. })));
    }

    #[tokio::test]
    async fn test_product_writes_go_to_low_queue() {
        let (broker, service) = service();
        let document = ProductDocument {
            product_id: Uuid::new_v4(),
            name: "Amoxicillin 500mg".to_string(),
            generic_name: Some("amoxicillin".to_string()),
            manufacturer: None,
            category: Some("antibiotic".to_string()),
            price: None,
            is_active: true,
        };
        service.product_saved(document.clone(), true).await.unwrap();
        service.product_saved(document, false).await.unwrap();

        let types: Vec<String> = broker.snapshot().into_iter().map(|t| t.task_type).collect();
        assert!(types.contains(&TaskType::CreateProduct.as_str().to_string()));
        assert!(types.contains(&TaskType::UpdateProduct.as_str().to_string()));
        assert!(broker.snapshot().iter().all(|t| t.queue == QueueClass::Low));
    }
}
