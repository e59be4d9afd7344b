//! # Broker Types
//!
//! Identifiers, queue classes, and the task records exchanged between
//! producers, the broker, and workers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broker-assigned task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority bucket governing relative worker attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueClass {
    Critical,
    Default,
    Low,
}

impl QueueClass {
    /// Every class, highest priority first
    pub const ALL: [QueueClass; 3] = [Self::Critical, Self::Default, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Default => "default",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for QueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "default" => Ok(Self::Default),
            "low" => Ok(Self::Low),
            _ => Err(format!("Invalid queue class: {s}")),
        }
    }
}

/// A task as handed to the broker by a producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub task_type: String,
    /// Serialized payload; the broker never looks inside
    pub payload: Vec<u8>,
    pub queue: QueueClass,
    /// Earliest dispatch is `enqueue time + delay`
    pub delay: Duration,
    pub timeout: Duration,
    /// Upper bound on delivery attempts, including the first
    pub max_retries: u32,
}

/// A task reserved by a worker
///
/// The worker holds a lease until `timeout + lease_grace` elapses. If it
/// neither acks nor fails the task before then, the broker redelivers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedTask {
    pub id: TaskId,
    pub task_type: String,
    pub payload: Vec<u8>,
    pub queue: QueueClass,
    /// 1 on first delivery
    pub attempt: u32,
    pub max_retries: u32,
    pub timeout: Duration,
    pub enqueued_at: DateTime<Utc>,
}

impl LeasedTask {
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_retries
    }
}

/// What the broker did with a failed task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Requeued; visible again after `retry_in`
    Retrying { attempt: u32, retry_in: Duration },
    /// Attempts exhausted or failure permanent; moved to the dead-letter sink
    DeadLettered { attempts: u32 },
}

/// A task that will not be retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: TaskId,
    pub task_type: String,
    pub payload: Vec<u8>,
    pub queue: QueueClass,
    pub attempts: u32,
    pub last_error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Point-in-time counters for one queue class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue: Option<QueueClass>,
    /// Visible now
    pub ready: u64,
    /// Waiting for their delay or backoff to elapse
    pub scheduled: u64,
    /// Leased by a worker
    pub in_flight: u64,
    pub total_enqueued: u64,
    pub total_completed: u64,
    pub total_retried: u64,
    pub total_dead_lettered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_class_parsing() {
        assert_eq!("critical".parse::<QueueClass>(), Ok(QueueClass::Critical));
        assert_eq!(" LOW ".parse::<QueueClass>(), Ok(QueueClass::Low));
        assert!("urgent".parse::<QueueClass>().is_err());
        assert_eq!(
            serde_json::to_string(&QueueClass::Default).unwrap(),
            "\"default\""
        );
    }

    #[test]
    fn test_last_attempt() {
        let mut task = LeasedTask {
            id: TaskId::new(),
            task_type: "order:auto_process".to_string(),
            payload: Vec::new(),
            queue: QueueClass::Critical,
            attempt: 1,
            max_retries: 2,
            timeout: Duration::from_secs(1),
            enqueued_at: Utc::now(),
        };
        assert!(!task.is_last_attempt());
        task.attempt = 2;
        assert!(task.is_last_attempt());
    }
}
