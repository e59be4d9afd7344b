use super::states::OrderStatus;
use crate::errors::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Error types for order state machine operations
#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Guard condition failed: {0}")]
    GuardFailed(#[from] GuardError),

    #[error("Order {order_id} not found")]
    OrderNotFound { order_id: Uuid },

    #[error("Order {order_id} changed concurrently: expected {expected}, found {actual}")]
    ConcurrentModification {
        order_id: Uuid,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error("Persistence operation failed: {0}")]
    Persistence(#[from] StoreError),
}

/// Specific error type for guard condition failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Cannot transition from terminal state {state}")]
    TerminalState { state: OrderStatus },

    #[error("Transition {from} -> {to} is not part of the order lifecycle")]
    IllegalEdge { from: OrderStatus, to: OrderStatus },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type GuardResult<T> = Result<T, GuardError>;

impl GuardError {
    /// Status the rejected transition started from
    pub fn from_state(&self) -> OrderStatus {
        match self {
            Self::TerminalState { state } => *state,
            Self::IllegalEdge { from, .. } => *from,
        }
    }
}
