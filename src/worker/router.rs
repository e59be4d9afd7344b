//! # Task Router
//!
//! Decodes a leased task into its [`TaskKind`] and hands the payload to the
//! matching handler. The match is exhaustive and the router is built with a
//! handler for every kind, so there is no "unroutable task" at runtime; a task
//! whose type string or payload cannot be decoded is a permanent failure.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::handlers::{
    AutoConfirmOrdersHandler, AutoProcessOrderHandler, IndexJob, MailHandler, MailJob,
    ProductIndexHandler,
};
use crate::errors::HandlerError;
use crate::indexing::ProductIndex;
use crate::messaging::LeasedTask;
use crate::notification::Notifier;
use crate::store::OrderStore;
use crate::tasks::{AutoConfirmOrdersPayload, AutoProcessOrderPayload, TaskKind};

/// Successful handler result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The side effect was performed
    Completed,
    /// Nothing to do: the state the task was scheduled for no longer holds
    Skipped { reason: String },
}

impl HandlerOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

pub type HandlerResult = Result<HandlerOutcome, HandlerError>;

/// Executes one task kind
#[async_trait]
pub trait TaskHandler: Send + Sync {
    type Payload: Send + 'static;

    fn name(&self) -> &'static str;

    async fn handle(&self, payload: Self::Payload) -> HandlerResult;
}

type Handler<P> = Arc<dyn TaskHandler<Payload = P>>;

#[derive(Clone)]
pub struct TaskRouter {
    auto_process: Handler<AutoProcessOrderPayload>,
    auto_confirm: Handler<AutoConfirmOrdersPayload>,
    mail: Handler<MailJob>,
    product_index: Handler<IndexJob>,
}

impl fmt::Debug for TaskRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRouter")
            .field("auto_process", &self.auto_process.name())
            .field("auto_confirm", &self.auto_confirm.name())
            .field("mail", &self.mail.name())
            .field("product_index", &self.product_index.name())
            .finish()
    }
}

impl TaskRouter {
    /// Register one handler per task family
    pub fn new(
        auto_process: Handler<AutoProcessOrderPayload>,
        auto_confirm: Handler<AutoConfirmOrdersPayload>,
        mail: Handler<MailJob>,
        product_index: Handler<IndexJob>,
    ) -> Self {
        Self {
            auto_process,
            auto_confirm,
            mail,
            product_index,
        }
    }

    /// Router with the production handlers wired to the given collaborators
    pub fn with_collaborators(
        store: Arc<dyn OrderStore>,
        notifier: Arc<dyn Notifier>,
        index: Arc<dyn ProductIndex>,
    ) -> Self {
        Self::new(
            Arc::new(AutoProcessOrderHandler::new(store.clone())),
            Arc::new(AutoConfirmOrdersHandler::new(store)),
            Arc::new(MailHandler::new(notifier)),
            Arc::new(ProductIndexHandler::new(index)),
        )
    }

    /// Decode and route a leased task
    pub async fn dispatch(&self, task: &LeasedTask) -> HandlerResult {
        let kind = TaskKind::decode(&task.task_type, &task.payload).map_err(|e| {
            HandlerError::permanent(format!(
                "cannot decode task {} of type {}: {e}",
                task.id, task.task_type
            ))
        })?;
        self.route(kind).await
    }

    pub async fn route(&self, kind: TaskKind) -> HandlerResult {
        match kind {
            TaskKind::AutoProcessOrder(payload) => self.auto_process.handle(payload).await,
            TaskKind::AutoConfirmOrders(payload) => self.auto_confirm.handle(payload).await,
            TaskKind::SendVerificationEmail(payload) => {
                self.mail.handle(MailJob::Verification(payload)).await
            }
            TaskKind::SendPasswordResetEmail(payload) => {
                self.mail.handle(MailJob::PasswordReset(payload)).await
            }
            TaskKind::SendPharmacistAccountEmail(payload) => {
                self.mail.handle(MailJob::PharmacistAccount(payload)).await
            }
            TaskKind::CreateProduct(document) => {
                self.product_index.handle(IndexJob::Create(document)).await
            }
            TaskKind::UpdateProduct(document) => {
                self.product_index.handle(IndexJob::Update(document)).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::InMemoryProductIndex;
    use crate::messaging::{QueueClass, TaskId};
    use crate::notification::{InMemoryNotifier, MailTemplate};
    use crate::store::InMemoryOrderStore;
    use crate::tasks::VerificationEmailPayload;
    use chrono::Utc;
    use std::time::Duration;

    fn router() -> (Arc<InMemoryNotifier>, TaskRouter) {
        let notifier = Arc::new(InMemoryNotifier::new());
        let router = TaskRouter::with_collaborators(
            Arc::new(InMemoryOrderStore::new()),
            notifier.clone(),
            Arc::new(InMemoryProductIndex::new()),
        );
        (notifier, router)
    }

    fn leased(task_type: &str, payload: &[u8]) -> LeasedTask {
        LeasedTask {
            id: TaskId::new(),
            task_type: task_type.to_string(),
            payload: payload.to_vec(),
            queue: QueueClass::Default,
            attempt: 1,
            max_retries: 10,
            timeout: Duration::from_secs(5),
            enqueued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_routes_email_to_mail_handler() {
        let (notifier, router) = router();
        let kind = TaskKind::SendVerificationEmail(VerificationEmailPayload {
            email: "sari@example.com".to_string(),
            name: "Sari".to_string(),
            verification_link: "https://example.com/verify/abc".to_string(),
        });
        let task = leased(kind.task_type().as_str(), &kind.encode().unwrap());

        assert_eq!(router.dispatch(&task).await, Ok(HandlerOutcome::Completed));
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.sent()[0].template, MailTemplate::Verification);
    }

    #[tokio::test]
    async fn test_undecodable_task_is_permanent_failure() {
        let (_notifier, router) = router();

        let unknown = router.dispatch(&leased("order:auto_refund", b"{}")).await;
        assert!(matches!(unknown, Err(HandlerError::Permanent { .. })));

        let garbage = router
            .dispatch(&leased("email:verification", b"not json"))
            .await;
        assert!(matches!(garbage, Err(HandlerError::Permanent { .. })));
    }
}
