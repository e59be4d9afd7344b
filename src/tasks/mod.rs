//! # Deferred Tasks
//!
//! Closed set of task kinds, their payloads, default scheduling policies, and
//! the producer that turns a [`TaskKind`] into a broker task.

pub mod enqueuer;
pub mod kinds;
pub mod payloads;
pub mod policy;

pub use enqueuer::TaskEnqueuer;
pub use kinds::{TaskKind, TaskType};
pub use payloads::{
    AutoConfirmOrdersPayload, AutoProcessOrderPayload, PasswordResetEmailPayload,
    PharmacistAccountEmailPayload, VerificationEmailPayload,
};
pub use policy::{EnqueueOptions, TaskPolicies, TaskPolicy};
