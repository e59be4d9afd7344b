//! # Task Workers
//!
//! Consumes ready tasks from the broker and executes their handlers.
//!
//! ```text
//! broker --reserve--> [WeightedQueueSelector] --> [Semaphore] --> TaskRouter --> handler
//!                                                                      |
//!                              broker <--ack / fail(retryable)---------+
//! ```

pub mod handlers;
pub mod pool;
pub mod router;
pub mod runtime;
pub mod scheduler;

pub use handlers::{
    AutoConfirmOrdersHandler, AutoProcessOrderHandler, IndexJob, MailHandler, MailJob,
    ProductIndexHandler,
};
pub use pool::{WorkerPool, WorkerPoolConfig, WorkerPoolHandle, WorkerStats, WorkerStatsSnapshot};
pub use router::{HandlerOutcome, HandlerResult, TaskHandler, TaskRouter};
pub use runtime::WorkerRuntime;
pub use scheduler::WeightedQueueSelector;
