use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::{
    errors::{StateMachineError, StateMachineResult},
    guards::TransitionGuard,
    states::OrderStatus,
};
use crate::constants::transition_event;
use crate::logging::log_order_operation;
use crate::models::Order;
use crate::store::{OrderStore, StatusUpdate};

/// Executes order status transitions against the store
///
/// Every transition is a compare-and-swap on the status the caller observed,
/// so two writers racing on the same order cannot both win. The loser gets
/// [`StateMachineError::ConcurrentModification`] and nothing is written.
#[derive(Clone)]
pub struct OrderStateMachine {
    store: Arc<dyn OrderStore>,
}

impl std::fmt::Debug for OrderStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStateMachine").finish_non_exhaustive()
    }
}

impl OrderStateMachine {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Current status of a live (not soft-deleted) order
    pub async fn current_status(&self, order_id: Uuid) -> StateMachineResult<OrderStatus> {
        match self.store.find(order_id).await? {
            Some(order) if !order.is_deleted() => Ok(order.status),
            _ => Err(StateMachineError::OrderNotFound { order_id }),
        }
    }

    /// Move `order_id` from `expected` to `target`
    ///
    /// The edge is validated before touching the store. On success the
    /// updated order is returned with `updated_at` bumped.
    pub async fn transition(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        target: OrderStatus,
    ) -> StateMachineResult<Order> {
        TransitionGuard::can_transition(expected, target)?;

        match self
            .store
            .update_status_if(order_id, expected, target, Utc::now())
            .await?
        {
            StatusUpdate::Applied(order) => {
                let event = transition_event(expected, target).unwrap_or("order.transitioned");
                log_order_operation(
                    event,
                    order_id,
                    target.as_str(),
                    Some(&format!("{expected} -> {target}")),
                );
                Ok(order)
            }
            StatusUpdate::Mismatch { actual } => {
                tracing::debug!(
                    order_id = %order_id,
                    expected = %expected,
                    actual = %actual,
                    target = %target,
                    "Status changed underneath transition"
                );
                Err(StateMachineError::ConcurrentModification {
                    order_id,
                    expected,
                    actual,
                })
            }
            StatusUpdate::NotFound => Err(StateMachineError::OrderNotFound { order_id }),
        }
    }
}
