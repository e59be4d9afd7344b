//! # Notification Collaborator
//!
//! Transactional mail delivery. Handlers hand over a template and its data;
//! the notifier classifies failures as transient (retry) or permanent.

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::NotificationError;

/// Mail templates the backend sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailTemplate {
    Verification,
    PasswordReset,
    PharmacistAccount,
}

impl MailTemplate {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Verification => "Verify your email address",
            Self::PasswordReset => "Reset your password",
            Self::PharmacistAccount => "Your pharmacist account is ready",
        }
    }
}

impl fmt::Display for MailTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Verification => "verification",
            Self::PasswordReset => "password_reset",
            Self::PharmacistAccount => "pharmacist_account",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        template: MailTemplate,
        data: serde_json::Value,
    ) -> Result<(), NotificationError>;
}

/// A mail captured by [`InMemoryNotifier`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub template: MailTemplate,
    pub data: serde_json::Value,
}

/// Recording notifier with scripted failures
///
/// Each queued failure is consumed by one `send` call, in order; once the
/// script is empty every send succeeds and is recorded.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<SentMail>>,
    failures: Mutex<VecDeque<NotificationError>>,
    attempts: Mutex<usize>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: NotificationError) {
        self.failures.lock().push_back(error);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    /// Number of `send` calls, successful or not
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(
        &self,
        template: MailTemplate,
        data: serde_json::Value,
    ) -> Result<(), NotificationError> {
        *self.attempts.lock() += 1;
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        self.sent.lock().push(SentMail { template, data });
        Ok(())
    }
}

/// Notifier that only writes the mail to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        template: MailTemplate,
        data: serde_json::Value,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            template = %template,
            subject = template.subject(),
            recipient = data.get("email").and_then(|v| v.as_str()),
            "Mail dispatched"
        );
        Ok(())
    }
}
