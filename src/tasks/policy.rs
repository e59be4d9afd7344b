//! Scheduling policies per task type
//!
//! | Task | Delay | Timeout | Max retries | Queue |
//! |---|---|---|---|---|
//! | verification / password reset / pharmacist account email | 0 | 5s | 10 | default |
//! | auto-process order | 1 min | 25s | 20 | critical |
//! | auto-confirm orders | 7 days | 10s | 20 | critical |
//! | create / update product index | 0 | 25s | 20 | low |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::kinds::TaskType;
use crate::config::ConfigurationError;
use crate::constants::system;
use crate::messaging::QueueClass;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPolicy {
    pub delay_seconds: u64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub queue: QueueClass,
}

impl TaskPolicy {
    pub const fn new(delay_seconds: u64, timeout_seconds: u64, max_retries: u32, queue: QueueClass) -> Self {
        Self {
            delay_seconds,
            timeout_seconds,
            max_retries,
            queue,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// One policy per task type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPolicies {
    pub verification_email: TaskPolicy,
    pub password_reset_email: TaskPolicy,
    pub pharmacist_account_email: TaskPolicy,
    pub auto_process_order: TaskPolicy,
    pub auto_confirm_orders: TaskPolicy,
    pub create_product: TaskPolicy,
    pub update_product: TaskPolicy,
}

impl Default for TaskPolicies {
    fn default() -> Self {
        let email = TaskPolicy::new(0, 5, 10, QueueClass::Default);
        let index = TaskPolicy::new(0, 25, 20, QueueClass::Low);
        Self {
            verification_email: email,
            password_reset_email: email,
            pharmacist_account_email: email,
            auto_process_order: TaskPolicy::new(60, 25, 20, QueueClass::Critical),
            auto_confirm_orders: TaskPolicy::new(7 * SECONDS_PER_DAY, 10, 20, QueueClass::Critical),
            create_product: index,
            update_product: index,
        }
    }
}

impl TaskPolicies {
    pub fn for_type(&self, task_type: TaskType) -> &TaskPolicy {
        match task_type {
            TaskType::SendVerificationEmail => &self.verification_email,
            TaskType::SendPasswordResetEmail => &self.password_reset_email,
            TaskType::SendPharmacistAccountEmail => &self.pharmacist_account_email,
            TaskType::AutoProcessOrder => &self.auto_process_order,
            TaskType::AutoConfirmOrders => &self.auto_confirm_orders,
            TaskType::CreateProduct => &self.create_product,
            TaskType::UpdateProduct => &self.update_product,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for task_type in TaskType::ALL {
            let policy = self.for_type(task_type);
            if policy.timeout_seconds == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("tasks.{task_type}.timeout_seconds"),
                    policy.timeout_seconds,
                    "must be greater than zero",
                ));
            }
            if policy.timeout_seconds > system::MAX_TASK_TIMEOUT_SECONDS {
                return Err(ConfigurationError::invalid_value(
                    format!("tasks.{task_type}.timeout_seconds"),
                    policy.timeout_seconds,
                    format!("must not exceed {}", system::MAX_TASK_TIMEOUT_SECONDS),
                ));
            }
            if policy.delay_seconds > system::MAX_TASK_DELAY_SECONDS {
                return Err(ConfigurationError::invalid_value(
                    format!("tasks.{task_type}.delay_seconds"),
                    policy.delay_seconds,
                    format!("must not exceed {}", system::MAX_TASK_DELAY_SECONDS),
                ));
            }
            if policy.max_retries == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("tasks.{task_type}.max_retries"),
                    policy.max_retries,
                    "must allow at least one attempt",
                ));
            }
        }
        Ok(())
    }
}

/// Per-call overrides of a task type's policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub delay: Option<Duration>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub queue: Option<QueueClass>,
}

impl EnqueueOptions {
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn queue(mut self, queue: QueueClass) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Fill unset fields from `policy`
    pub fn resolve(&self, policy: &TaskPolicy) -> (Duration, Duration, u32, QueueClass) {
        (
            self.delay.unwrap_or_else(|| policy.delay()),
            self.timeout.unwrap_or_else(|| policy.timeout()),
            self.max_retries.unwrap_or(policy.max_retries),
            self.queue.unwrap_or(policy.queue),
        )
    }
}
