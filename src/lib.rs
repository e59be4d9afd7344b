#![allow(clippy::doc_markdown)] // Allow technical terms like DashMap, TOML in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Orderflow Core
//!
//! Order lifecycle state machine and deferred task orchestration for a pharmacy
//! ordering backend.
//!
//! ## Overview
//!
//! Orders move through a small, strictly validated status graph
//! (`WAITING → PROCESSED → SENT → CONFIRMED`, with roll-back, reopen and
//! cancellation edges). User actions mutate orders through [`services::OrderService`],
//! which schedules time-delayed follow-up work on a priority-classed task broker.
//! A bounded [`worker::WorkerPool`] drains the broker with weighted fair dispatch,
//! executes handlers under per-task timeouts, and reports failures back to the
//! broker, which owns retry counters, backoff, and dead-lettering.
//!
//! ## Module Organization
//!
//! - [`models`] - Order aggregate and line items
//! - [`state_machine`] - Order statuses, the legal transition graph, CAS transitions
//! - [`tasks`] - Task kinds, payloads, scheduling policies and the enqueuer
//! - [`messaging`] - Broker abstraction, in-memory broker, backoff schedule
//! - [`worker`] - Router, handlers, weighted scheduler and the worker pool
//! - [`services`] - Order use cases and notification orchestration
//! - [`store`], [`catalog`], [`notification`], [`indexing`] - External collaborators
//! - [`config`] - Layered configuration
//! - [`errors`] - Structured error handling
//! - [`logging`] - Structured tracing setup
//!
//! ## Quick Start
//!
//! ```rust
//! use orderflow_core::state_machine::{is_valid_transition, OrderStatus};
//!
//! assert!(is_valid_transition(OrderStatus::Waiting, OrderStatus::Processed));
//! assert!(!is_valid_transition(OrderStatus::Sent, OrderStatus::Cancelled));
//! ```

pub mod catalog;
pub mod config;
pub mod constants;
pub mod errors;
pub mod indexing;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod notification;
pub mod services;
pub mod state_machine;
pub mod store;
pub mod tasks;
pub mod worker;

pub use config::{ConfigManager, OrderflowConfig};
pub use errors::{
    CatalogError, HandlerError, NotificationError, OrderError, OrderflowError, OrderflowResult,
    StoreError, WorkerError,
};
pub use messaging::{InMemoryTaskBroker, MessagingError, QueueClass, TaskBroker, TaskId};
pub use models::{Order, OrderProduct};
pub use services::OrderService;
pub use state_machine::{is_valid_transition, OrderStatus};
pub use tasks::{TaskEnqueuer, TaskKind, TaskType};
pub use worker::{TaskRouter, WorkerPool, WorkerPoolHandle};
