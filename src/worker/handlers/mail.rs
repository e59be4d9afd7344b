//! Transactional email delivery

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::HandlerError;
use crate::notification::{MailTemplate, Notifier};
use crate::tasks::payloads::validate_recipient;
use crate::tasks::{
    PasswordResetEmailPayload, PharmacistAccountEmailPayload, VerificationEmailPayload,
};
use crate::worker::router::{HandlerOutcome, HandlerResult, TaskHandler};

/// Any of the three account emails
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailJob {
    Verification(VerificationEmailPayload),
    PasswordReset(PasswordResetEmailPayload),
    PharmacistAccount(PharmacistAccountEmailPayload),
}

impl MailJob {
    pub fn template(&self) -> MailTemplate {
        match self {
            Self::Verification(_) => MailTemplate::Verification,
            Self::PasswordReset(_) => MailTemplate::PasswordReset,
            Self::PharmacistAccount(_) => MailTemplate::PharmacistAccount,
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Self::Verification(payload) => &payload.email,
            Self::PasswordReset(payload) => &payload.email,
            Self::PharmacistAccount(payload) => &payload.email,
        }
    }

    fn template_data(&self) -> Result<serde_json::Value, serde_json::Error> {
        fn to_value<T: Serialize>(payload: &T) -> Result<serde_json::Value, serde_json::Error> {
            serde_json::to_value(payload)
        }
        match self {
            Self::Verification(payload) => to_value(payload),
            Self::PasswordReset(payload) => to_value(payload),
            Self::PharmacistAccount(payload) => to_value(payload),
        }
    }
}

pub struct MailHandler {
    notifier: Arc<dyn Notifier>,
}

impl MailHandler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl TaskHandler for MailHandler {
    type Payload = MailJob;

    fn name(&self) -> &'static str {
        "mail"
    }

    async fn handle(&self, job: MailJob) -> HandlerResult {
        validate_recipient(job.recipient()).map_err(HandlerError::permanent)?;

        let data = job
            .template_data()
            .map_err(|e| HandlerError::permanent(format!("cannot render template data: {e}")))?;
        self.notifier.send(job.template(), data).await?;

        tracing::debug!(template = %job.template(), "Mail handed to notifier");
        Ok(HandlerOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NotificationError;
    use crate::notification::InMemoryNotifier;

    fn reset(email: &str) -> MailJob {
        MailJob::PasswordReset(PasswordResetEmailPayload {
            email: email.to_string(),
            name: "Dewi".to_string(),
            reset_link: "https://example.com/reset/xyz".to_string(),
        })
    }

    #[tokio::test]
    async fn test_sends_template_with_payload_data() {
        let notifier = Arc::new(InMemoryNotifier::new());
        let handler = MailHandler::new(notifier.clone());

        assert_eq!(
            handler.handle(reset("dewi@example.com")).await,
            Ok(HandlerOutcome::Completed)
        );
        let sent = notifier.sent();
        assert_eq!(sent[0].template, MailTemplate::PasswordReset);
        assert_eq!(sent[0].data["reset_link"], "https://example.com/reset/xyz");
    }

    #[tokio::test]
    async fn test_bad_recipient_is_permanent_without_sending() {
        let notifier = Arc::new(InMemoryNotifier::new());
        let handler = MailHandler::new(notifier.clone());

        let result = handler.handle(reset("not-an-address")).await;
        assert!(matches!(result, Err(HandlerError::Permanent { .. })));
        assert_eq!(notifier.attempts(), 0);
    }

    #[tokio::test]
    async fn test_notifier_failures_keep_their_class() {
        let notifier = Arc::new(InMemoryNotifier::new());
        notifier.fail_next(NotificationError::transient("smtp timeout"));
        notifier.fail_next(NotificationError::permanent("mailbox does not exist"));
        let handler = MailHandler::new(notifier.clone());

        let first = handler.handle(reset("dewi@example.com")).await;
        assert!(matches!(first, Err(ref e) if e.is_retryable()));
        let second = handler.handle(reset("dewi@example.com")).await;
        assert!(matches!(second, Err(ref e) if !e.is_retryable()));
    }
}
