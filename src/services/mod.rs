//! Use-case orchestration on top of the state machine and the task producer

pub mod notifications;
pub mod order_service;

pub use notifications::NotificationService;
pub use order_service::{Actor, CheckoutRequest, OrderService, SendOrdersReport};
