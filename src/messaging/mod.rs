//! # Task Broker
//!
//! Queue storage for deferred tasks. The broker alone owns visibility,
//! leases, attempt counters, backoff, and the dead-letter sink; producers
//! only enqueue and workers only reserve, ack, and report failures.

pub mod backoff;
pub mod broker;
pub mod errors;
pub mod in_memory;
pub mod types;

pub use backoff::BackoffCalculator;
pub use broker::TaskBroker;
pub use errors::{MessagingError, MessagingResult};
pub use in_memory::InMemoryTaskBroker;
pub use types::{
    DeadLetter, FailureDisposition, LeasedTask, NewTask, QueueClass, QueueStats, TaskId,
};
