//! Order lifecycle handlers: auto-process after payment proof, auto-confirm
//! after the delivery window.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::HandlerError;
use crate::state_machine::{OrderStateMachine, OrderStatus, StateMachineError};
use crate::store::OrderStore;
use crate::tasks::{AutoConfirmOrdersPayload, AutoProcessOrderPayload};
use crate::worker::router::{HandlerOutcome, HandlerResult, TaskHandler};

/// Result of one transition attempt inside a handler
enum Step {
    Applied,
    Skipped(String),
}

/// Classify a state machine failure: lost races and vanished orders are
/// nothing-to-do, store outages are worth retrying.
fn classify(order_id: Uuid, error: StateMachineError) -> Result<Step, HandlerError> {
    match error {
        StateMachineError::Persistence(store_error) => Err(store_error.into()),
        StateMachineError::ConcurrentModification { actual, .. } => Ok(Step::Skipped(format!(
            "order {order_id} moved to {actual} concurrently"
        ))),
        StateMachineError::OrderNotFound { .. } => {
            Ok(Step::Skipped(format!("order {order_id} no longer exists")))
        }
        StateMachineError::GuardFailed(guard) => Ok(Step::Skipped(guard.to_string())),
    }
}

/// `WAITING` with proof uploaded becomes `PROCESSED`
pub struct AutoProcessOrderHandler {
    store: Arc<dyn OrderStore>,
    machine: OrderStateMachine,
}

impl AutoProcessOrderHandler {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        let machine = OrderStateMachine::new(store.clone());
        Self { store, machine }
    }

    async fn process(&self, order_id: Uuid) -> Result<Step, HandlerError> {
        let order = match self.store.find(order_id).await? {
            Some(order) if !order.is_deleted() => order,
            _ => return Ok(Step::Skipped(format!("order {order_id} no longer exists"))),
        };
        if order.status != OrderStatus::Waiting {
            return Ok(Step::Skipped(format!(
                "order {order_id} is {} instead of WAITING",
                order.status
            )));
        }
        if !order.has_payment_proof() {
            return Ok(Step::Skipped(format!("order {order_id} has no payment proof")));
        }

        match self
            .machine
            .transition(order_id, OrderStatus::Waiting, OrderStatus::Processed)
            .await
        {
            Ok(_) => Ok(Step::Applied),
            Err(error) => classify(order_id, error),
        }
    }
}

#[async_trait]
impl TaskHandler for AutoProcessOrderHandler {
    type Payload = AutoProcessOrderPayload;

    fn name(&self) -> &'static str {
        "auto_process_order"
    }

    async fn handle(&self, payload: AutoProcessOrderPayload) -> HandlerResult {
        match self.process(payload.order_id).await? {
            Step::Applied => {
                info!(order_id = %payload.order_id, "Order auto-processed");
                Ok(HandlerOutcome::Completed)
            }
            Step::Skipped(reason) => {
                debug!(order_id = %payload.order_id, reason = %reason, "Auto-process skipped");
                Ok(HandlerOutcome::skipped(reason))
            }
        }
    }
}

/// `SENT` orders untouched since scheduling become `CONFIRMED`
pub struct AutoConfirmOrdersHandler {
    store: Arc<dyn OrderStore>,
    machine: OrderStateMachine,
}

impl AutoConfirmOrdersHandler {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        let machine = OrderStateMachine::new(store.clone());
        Self { store, machine }
    }

    async fn confirm(
        &self,
        order_id: Uuid,
        payload: &AutoConfirmOrdersPayload,
    ) -> Result<Step, HandlerError> {
        let order = match self.store.find(order_id).await? {
            Some(order) if !order.is_deleted() => order,
            _ => return Ok(Step::Skipped(format!("order {order_id} no longer exists"))),
        };
        if order.status != OrderStatus::Sent {
            return Ok(Step::Skipped(format!(
                "order {order_id} is {} instead of SENT",
                order.status
            )));
        }
        if order.updated_at > payload.scheduled_at {
            return Ok(Step::Skipped(format!(
                "order {order_id} changed after confirmation was scheduled"
            )));
        }

        match self
            .machine
            .transition(order_id, OrderStatus::Sent, OrderStatus::Confirmed)
            .await
        {
            Ok(_) => Ok(Step::Applied),
            Err(error) => classify(order_id, error),
        }
    }
}

#[async_trait]
impl TaskHandler for AutoConfirmOrdersHandler {
    type Payload = AutoConfirmOrdersPayload;

    fn name(&self) -> &'static str {
        "auto_confirm_orders"
    }

    /// Confirms every eligible order in the batch
    ///
    /// A store outage fails the whole batch for retry; orders already
    /// confirmed on a previous attempt are skipped the second time round.
    async fn handle(&self, payload: AutoConfirmOrdersPayload) -> HandlerResult {
        let mut confirmed = 0usize;
        for order_id in &payload.order_ids {
            match self.confirm(*order_id, &payload).await? {
                Step::Applied => confirmed += 1,
                Step::Skipped(reason) => {
                    debug!(order_id = %order_id, reason = %reason, "Auto-confirm skipped order");
                }
            }
        }

        info!(
            requested = payload.order_ids.len(),
            confirmed = confirmed,
            "Auto-confirm batch finished"
        );

        if confirmed == 0 {
            Ok(HandlerOutcome::skipped("no order in the batch was eligible"))
        } else {
            Ok(HandlerOutcome::Completed)
        }
    }
}
