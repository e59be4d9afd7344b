//! Error types for the order lifecycle and task orchestration.
//!
//! Errors fall in three families:
//! - validation errors ([`OrderError`] client variants): surfaced to the caller, never retried
//! - transient infrastructure errors ([`StoreError::Unavailable`], broker and
//!   notifier outages): retried by the broker when they happen inside a task handler
//! - fatal configuration errors ([`ConfigurationError`]): abort startup

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigurationError;
use crate::indexing::IndexError;
use crate::messaging::MessagingError;
use crate::state_machine::{OrderStatus, StateMachineError};

/// Top-level error for callers that do not care about the concern
#[derive(Debug, Error)]
pub enum OrderflowError {
    #[error("Order error: {0}")]
    Order(#[from] OrderError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),
}

pub type OrderflowResult<T> = Result<T, OrderflowError>;

/// Errors raised by order use cases
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order must contain at least one line item")]
    EmptyOrder,

    #[error("Quantity for product {pharmacy_product_id} must be greater than zero")]
    InvalidQuantity { pharmacy_product_id: Uuid },

    #[error("Shipping cost {ship_cost} must not be negative")]
    InvalidShipCost { ship_cost: Decimal },

    #[error("Pharmacy product {pharmacy_product_id} not found")]
    ProductNotFound { pharmacy_product_id: Uuid },

    #[error("Pharmacy product {pharmacy_product_id} is not active")]
    InactiveProduct { pharmacy_product_id: Uuid },

    #[error("Pharmacy {pharmacy_id} selling product {pharmacy_product_id} is not active")]
    InactivePharmacy {
        pharmacy_id: Uuid,
        pharmacy_product_id: Uuid,
    },

    #[error("Insufficient stock for product {pharmacy_product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        pharmacy_product_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("Order {order_id} not found")]
    OrderNotFound { order_id: Uuid },

    #[error("User {user_id} does not own order {order_id}")]
    NotOwner { order_id: Uuid, user_id: Uuid },

    #[error("{actor} may not move order {order_id} to {target}")]
    Forbidden {
        order_id: Uuid,
        actor: String,
        target: OrderStatus,
    },

    #[error("Payment proof reference must not be empty")]
    InvalidPaymentProof,

    #[error("Payment proof already uploaded for order {order_id}")]
    AlreadyUploaded { order_id: Uuid },

    #[error("Order {order_id} is {status} and no longer accepts a payment proof")]
    PaymentNotExpected { order_id: Uuid, status: OrderStatus },

    #[error("Invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidStatusTransition {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Order {order_id} changed concurrently: expected {expected}, found {actual}")]
    ConcurrentStatusChange {
        order_id: Uuid,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error("Could not allocate a unique voice number after {attempts} attempts")]
    VoiceNumberExhausted { attempts: u32 },

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Catalog failure: {0}")]
    Catalog(CatalogError),

    #[error("Failed to schedule follow-up task: {0}")]
    TaskEnqueue(#[from] MessagingError),
}

impl OrderError {
    /// Validation errors are the caller's fault and must not be retried
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::Store(_)
                | Self::Catalog(_)
                | Self::TaskEnqueue(_)
                | Self::VoiceNumberExhausted { .. }
                | Self::ConcurrentStatusChange { .. }
        )
    }
}

impl From<CatalogError> for OrderError {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::ProductNotFound {
                pharmacy_product_id,
            } => Self::ProductNotFound {
                pharmacy_product_id,
            },
            CatalogError::InsufficientStock {
                pharmacy_product_id,
                requested,
                available,
            } => Self::InsufficientStock {
                pharmacy_product_id,
                requested,
                available,
            },
            other => Self::Catalog(other),
        }
    }
}

/// Errors raised by the order store collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Voice number {voice_number} already exists")]
    DuplicateVoiceNumber { voice_number: String },

    #[error("Order {order_id} already exists")]
    DuplicateOrder { order_id: Uuid },

    #[error("Internal store error: {message}")]
    Internal { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Errors raised by the catalog / stock collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {message}")]
    Unavailable { message: String },

    #[error("Pharmacy product {pharmacy_product_id} not found")]
    ProductNotFound { pharmacy_product_id: Uuid },

    #[error("Insufficient stock for product {pharmacy_product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        pharmacy_product_id: Uuid,
        requested: u32,
        available: u32,
    },
}

/// Errors raised by the notification (mail) collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("Transient delivery failure: {message}")]
    Transient { message: String },

    #[error("Permanent delivery failure: {message}")]
    Permanent { message: String },
}

impl NotificationError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }
}

/// A broker that cannot take the task is a delivery outage, not a bad message
impl From<MessagingError> for NotificationError {
    fn from(error: MessagingError) -> Self {
        Self::transient(error.to_string())
    }
}

/// Outcome of a failed task handler execution
///
/// The broker retries `Transient` failures up to the task's `max_retries`;
/// `Permanent` failures are dead-lettered immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("Transient handler failure: {message}")]
    Transient { message: String },

    #[error("Permanent handler failure: {message}")]
    Permanent { message: String },
}

impl HandlerError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<StoreError> for HandlerError {
    fn from(error: StoreError) -> Self {
        if error.is_transient() {
            Self::transient(error.to_string())
        } else {
            Self::permanent(error.to_string())
        }
    }
}

impl From<NotificationError> for HandlerError {
    fn from(error: NotificationError) -> Self {
        match error {
            NotificationError::Transient { message } => Self::Transient { message },
            NotificationError::Permanent { message } => Self::Permanent { message },
        }
    }
}

impl From<MessagingError> for HandlerError {
    fn from(error: MessagingError) -> Self {
        Self::transient(error.to_string())
    }
}

impl From<IndexError> for HandlerError {
    fn from(error: IndexError) -> Self {
        match error {
            IndexError::Unavailable { .. } => Self::transient(error.to_string()),
            IndexError::Rejected { .. } => Self::permanent(error.to_string()),
        }
    }
}

/// Errors raised by the worker pool itself
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid worker configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Broker error: {0}")]
    Broker(#[from] MessagingError),

    #[error("Worker pool supervisor failed: {message}")]
    Supervisor { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        let order_id = Uuid::new_v4();
        assert!(OrderError::AlreadyUploaded { order_id }.is_client_error());
        assert!(OrderError::InvalidStatusTransition {
            order_id,
            from: OrderStatus::Sent,
            to: OrderStatus::Cancelled,
        }
        .is_client_error());
        assert!(!OrderError::Store(StoreError::unavailable("down")).is_client_error());
        assert!(!OrderError::TaskEnqueue(MessagingError::broker_unavailable("down"))
            .is_client_error());
    }

    #[test]
    fn test_catalog_validation_errors_map_to_order_errors() {
        let pharmacy_product_id = Uuid::new_v4();
        let error: OrderError = CatalogError::InsufficientStock {
            pharmacy_product_id,
            requested: 5,
            available: 2,
        }
        .into();
        assert!(matches!(
            error,
            OrderError::InsufficientStock { requested: 5, available: 2, .. }
        ));

        let error: OrderError = CatalogError::Unavailable {
            message: "timeout".into(),
        }
        .into();
        assert!(matches!(error, OrderError::Catalog(_)));
        assert!(!error.is_client_error());
    }

    #[test]
    fn test_handler_error_from_collaborators() {
        assert!(HandlerError::from(StoreError::unavailable("timeout")).is_retryable());
        assert!(!HandlerError::from(StoreError::Internal {
            message: "corrupt row".into()
        })
        .is_retryable());
        assert!(HandlerError::from(NotificationError::transient("smtp 421")).is_retryable());
        assert!(!HandlerError::from(NotificationError::permanent("bad address")).is_retryable());
    }

    #[test]
    fn test_concern_errors_lift_into_top_level() {
        fn place(items: usize) -> OrderflowResult<usize> {
            let checked: Result<usize, OrderError> = if items == 0 {
                Err(OrderError::EmptyOrder)
            } else {
                Ok(items)
            };
            Ok(checked?)
        }
        assert!(matches!(place(0), Err(OrderflowError::Order(OrderError::EmptyOrder))));
        assert_eq!(place(2).unwrap(), 2);

        let error: OrderflowError = MessagingError::broker_unavailable("down").into();
        assert!(error.to_string().starts_with("Messaging error"));
    }
}
