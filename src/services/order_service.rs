//! # Order Use Cases
//!
//! Checkout, payment proof upload, status changes and cancellation. Each use
//! case mutates the order through a conditional store write first and only
//! then schedules its follow-up task; when scheduling fails the write is
//! reverted so the caller can retry the whole operation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::CatalogService;
use crate::config::OrdersConfig;
use crate::constants::events;
use crate::errors::{OrderError, StoreError};
use crate::logging::{log_error, log_order_operation};
use crate::messaging::{MessagingError, TaskId};
use crate::models::{generate_voice_number, LineItemRequest, Order, PricedLine};
use crate::state_machine::{is_valid_transition, OrderStateMachine, OrderStatus, StateMachineError};
use crate::store::{OrderStore, ProofUpdate, StatusUpdate};
use crate::tasks::TaskEnqueuer;

/// Who is asking for an order operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Actor {
    /// The buyer; limited to their own orders
    Customer { user_id: Uuid },
    /// Pharmacy staff fulfilling orders
    Pharmacist,
    /// Background jobs and administrators
    System,
}

impl Actor {
    /// Status targets this actor may request
    ///
    /// Customers cancel or confirm receipt; pharmacists process, ship, roll
    /// back and cancel; the system may request anything the graph allows.
    pub fn may_request(&self, target: OrderStatus) -> bool {
        match self {
            Self::Customer { .. } => {
                matches!(target, OrderStatus::Cancelled | OrderStatus::Confirmed)
            }
            Self::Pharmacist => matches!(
                target,
                OrderStatus::Processed | OrderStatus::Sent | OrderStatus::Cancelled
            ),
            Self::System => true,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer { user_id } => write!(f, "customer {user_id}"),
            Self::Pharmacist => f.write_str("pharmacist"),
            Self::System => f.write_str("system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<LineItemRequest>,
    pub ship_cost: Decimal,
}

/// Per-order result of [`OrderService::send_orders`]
#[derive(Debug, Default)]
pub struct SendOrdersReport {
    pub sent: Vec<Order>,
    pub failed: Vec<(Uuid, OrderError)>,
    /// The single auto-confirm task covering every order in `sent`
    pub auto_confirm_task: Option<TaskId>,
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn CatalogService>,
    machine: OrderStateMachine,
    tasks: TaskEnqueuer,
    config: OrdersConfig,
}

impl fmt::Debug for OrderService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderService")
            .field("tasks", &self.tasks)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn CatalogService>,
        tasks: TaskEnqueuer,
        config: OrdersConfig,
    ) -> Self {
        let machine = OrderStateMachine::new(store.clone());
        Self {
            store,
            catalog,
            machine,
            tasks,
            config,
        }
    }

    /// Place a `WAITING` order for `user_id`
    ///
    /// Stock is reserved before the order is persisted and released again if
    /// persisting fails.
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<Order, OrderError> {
        if request.items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        if request.ship_cost.is_sign_negative() {
            return Err(OrderError::InvalidShipCost {
                ship_cost: request.ship_cost,
            });
        }

        let lines = merge_lines(&request.items)?;
        let priced = self.price_lines(&lines).await?;

        self.catalog.reserve(&lines).await?;

        match self.persist_new_order(user_id, &priced, request.ship_cost).await {
            Ok(order) => {
                log_order_operation(
                    events::ORDER_PLACED,
                    order.id,
                    order.status.as_str(),
                    Some(&format!(
                        "voice_number={} total_payment={}",
                        order.voice_number, order.total_payment
                    )),
                );
                Ok(order)
            }
            Err(e) => {
                self.release_stock(None, &lines).await;
                Err(e)
            }
        }
    }

    /// Attach the customer's payment proof and schedule auto-processing
    pub async fn attach_payment_proof(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        image_ref: &str,
    ) -> Result<Order, OrderError> {
        let image_ref = image_ref.trim();
        if image_ref.is_empty() {
            return Err(OrderError::InvalidPaymentProof);
        }

        self.load_for(order_id, Actor::Customer { user_id }).await?;

        let order = match self
            .store
            .attach_payment_proof_if_absent(order_id, image_ref, Utc::now())
            .await?
        {
            ProofUpdate::Attached(order) => order,
            ProofUpdate::AlreadyUploaded { .. } => {
                return Err(OrderError::AlreadyUploaded { order_id })
            }
            ProofUpdate::NotWaiting { status } => {
                return Err(OrderError::PaymentNotExpected { order_id, status })
            }
            ProofUpdate::NotFound => return Err(OrderError::OrderNotFound { order_id }),
        };

        if let Err(e) = self.tasks.schedule_auto_process(order_id).await {
            self.revert_payment_proof(order_id, image_ref, &e).await;
            return Err(e.into());
        }

        log_order_operation(
            events::ORDER_PAYMENT_PROOF_ATTACHED,
            order_id,
            order.status.as_str(),
            None,
        );
        Ok(order)
    }

    /// Move an order to `requested` on behalf of `actor`
    pub async fn change_status(
        &self,
        order_id: Uuid,
        requested: OrderStatus,
        actor: Actor,
    ) -> Result<Order, OrderError> {
        if requested == OrderStatus::Cancelled {
            return self.cancel(order_id, actor).await;
        }

        let order = self.load_for(order_id, actor).await?;
        self.authorize(order_id, actor, requested)?;
        let from = order.status;
        if !is_valid_transition(from, requested) {
            return Err(OrderError::InvalidStatusTransition {
                order_id,
                from,
                to: requested,
            });
        }

        let updated = self
            .machine
            .transition(order_id, from, requested)
            .await
            .map_err(|e| transition_error(order_id, requested, e))?;

        if requested == OrderStatus::Sent {
            if let Err(e) = self
                .tasks
                .schedule_auto_confirm(vec![order_id], updated.updated_at)
                .await
            {
                self.revert_status(order_id, OrderStatus::Sent, from, &e).await;
                return Err(e.into());
            }
        }

        Ok(updated)
    }

    /// Cancel a `WAITING` or `PROCESSED` order and return its stock
    ///
    /// A failed stock release is logged; the cancellation stands.
    pub async fn cancel(&self, order_id: Uuid, actor: Actor) -> Result<Order, OrderError> {
        let order = self.load_for(order_id, actor).await?;
        self.authorize(order_id, actor, OrderStatus::Cancelled)?;
        if !order.status.is_cancellable() {
            return Err(OrderError::InvalidStatusTransition {
                order_id,
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        let cancelled = self
            .machine
            .transition(order_id, order.status, OrderStatus::Cancelled)
            .await
            .map_err(|e| transition_error(order_id, OrderStatus::Cancelled, e))?;

        let lines: Vec<LineItemRequest> = cancelled
            .products
            .iter()
            .map(|product| LineItemRequest {
                pharmacy_product_id: product.pharmacy_product_id,
                quantity: product.quantity,
            })
            .collect();
        self.release_stock(Some(order_id), &lines).await;

        Ok(cancelled)
    }

    /// Ship a batch of `PROCESSED` orders under one auto-confirm task
    ///
    /// Orders that cannot be shipped are reported in `failed`; the rest move
    /// to `SENT`. If the auto-confirm task cannot be scheduled every shipped
    /// order is moved back to `PROCESSED` and the enqueue error is returned.
    pub async fn send_orders(
        &self,
        order_ids: &[Uuid],
        actor: Actor,
    ) -> Result<SendOrdersReport, OrderError> {
        let mut report = SendOrdersReport::default();

        for &order_id in order_ids {
            match self.ship_one(order_id, actor).await {
                Ok(order) => report.sent.push(order),
                Err(e) => {
                    debug!(order_id = %order_id, error = %e, "Order not shipped");
                    report.failed.push((order_id, e));
                }
            }
        }

        let Some(scheduled_at) = report.sent.iter().map(|order| order.updated_at).max() else {
            return Ok(report);
        };
        let sent_ids: Vec<Uuid> = report.sent.iter().map(|order| order.id).collect();

        match self
            .tasks
            .schedule_auto_confirm(sent_ids.clone(), scheduled_at)
            .await
        {
            Ok(task_id) => {
                info!(
                    shipped = sent_ids.len(),
                    failed = report.failed.len(),
                    task_id = %task_id,
                    "Orders shipped"
                );
                report.auto_confirm_task = Some(task_id);
                Ok(report)
            }
            Err(e) => {
                for order_id in sent_ids {
                    self.revert_status(order_id, OrderStatus::Sent, OrderStatus::Processed, &e)
                        .await;
                }
                Err(e.into())
            }
        }
    }

    /// Ownership-checked read
    pub async fn get_order(&self, order_id: Uuid, actor: Actor) -> Result<Order, OrderError> {
        self.load_for(order_id, actor).await
    }

    async fn ship_one(&self, order_id: Uuid, actor: Actor) -> Result<Order, OrderError> {
        let order = self.load_for(order_id, actor).await?;
        self.authorize(order_id, actor, OrderStatus::Sent)?;
        if order.status != OrderStatus::Processed {
            return Err(OrderError::InvalidStatusTransition {
                order_id,
                from: order.status,
                to: OrderStatus::Sent,
            });
        }
        self.machine
            .transition(order_id, OrderStatus::Processed, OrderStatus::Sent)
            .await
            .map_err(|e| transition_error(order_id, OrderStatus::Sent, e))
    }

    /// Live order visible to `actor`
    async fn load_for(&self, order_id: Uuid, actor: Actor) -> Result<Order, OrderError> {
        let order = self
            .store
            .find(order_id)
            .await?
            .filter(|order| !order.is_deleted())
            .ok_or(OrderError::OrderNotFound { order_id })?;

        if let Actor::Customer { user_id } = actor {
            if !order.is_owned_by(user_id) {
                return Err(OrderError::NotOwner { order_id, user_id });
            }
        }
        Ok(order)
    }

    fn authorize(&self, order_id: Uuid, actor: Actor, target: OrderStatus) -> Result<(), OrderError> {
        if actor.may_request(target) {
            Ok(())
        } else {
            Err(OrderError::Forbidden {
                order_id,
                actor: actor.to_string(),
                target,
            })
        }
    }

    /// Look up every line, checking existence, activity and stock
    async fn price_lines(&self, lines: &[LineItemRequest]) -> Result<Vec<PricedLine>, OrderError> {
        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let pharmacy_product_id = line.pharmacy_product_id;
            let product = self
                .catalog
                .availability(pharmacy_product_id)
                .await?
                .ok_or(OrderError::ProductNotFound {
                    pharmacy_product_id,
                })?;

            if !product.pharmacy_active {
                return Err(OrderError::InactivePharmacy {
                    pharmacy_id: product.pharmacy_id,
                    pharmacy_product_id,
                });
            }
            if !product.product_active {
                return Err(OrderError::InactiveProduct {
                    pharmacy_product_id,
                });
            }
            if product.stock < line.quantity {
                return Err(OrderError::InsufficientStock {
                    pharmacy_product_id,
                    requested: line.quantity,
                    available: product.stock,
                });
            }

            priced.push(PricedLine {
                pharmacy_product_id,
                quantity: line.quantity,
                unit_price: product.price,
            });
        }
        Ok(priced)
    }

    /// Insert with a fresh voice number, regenerating on collision
    async fn persist_new_order(
        &self,
        user_id: Uuid,
        priced: &[PricedLine],
        ship_cost: Decimal,
    ) -> Result<Order, OrderError> {
        let attempts = self.config.max_voice_number_attempts;
        for attempt in 1..=attempts {
            let now = Utc::now();
            let voice_number = generate_voice_number(&self.config.voice_number_prefix, now);
            let order = Order::place(user_id, priced, ship_cost, voice_number, now);

            match self.store.insert(order.clone()).await {
                Ok(()) => return Ok(order),
                Err(StoreError::DuplicateVoiceNumber { voice_number }) => {
                    warn!(
                        attempt = attempt,
                        voice_number = %voice_number,
                        "Voice number collision, regenerating"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(OrderError::VoiceNumberExhausted { attempts })
    }

    async fn release_stock(&self, order_id: Option<Uuid>, lines: &[LineItemRequest]) {
        if let Err(e) = self.catalog.release(lines).await {
            let context = order_id.map(|id| format!("order_id={id}"));
            log_error(
                "order_service",
                "release_stock",
                &e.to_string(),
                context.as_deref(),
            );
        }
    }

    async fn revert_payment_proof(&self, order_id: Uuid, image_ref: &str, cause: &MessagingError) {
        match self
            .store
            .clear_payment_proof_if(order_id, image_ref, Utc::now())
            .await
        {
            Ok(cleared) => warn!(
                order_id = %order_id,
                cleared = cleared,
                error = %cause,
                "Auto-process scheduling failed, payment proof reverted"
            ),
            Err(e) => error!(
                order_id = %order_id,
                error = %e,
                cause = %cause,
                "Failed to revert payment proof after scheduling failure"
            ),
        }
    }

    async fn revert_status(
        &self,
        order_id: Uuid,
        current: OrderStatus,
        previous: OrderStatus,
        cause: &MessagingError,
    ) {
        let reverted_at: DateTime<Utc> = Utc::now();
        match self
            .store
            .update_status_if(order_id, current, previous, reverted_at)
            .await
        {
            Ok(StatusUpdate::Applied(_)) => warn!(
                order_id = %order_id,
                status = %previous,
                error = %cause,
                "Auto-confirm scheduling failed, status reverted"
            ),
            Ok(outcome) => warn!(
                order_id = %order_id,
                outcome = ?outcome,
                "Status moved on before it could be reverted"
            ),
            Err(e) => error!(
                order_id = %order_id,
                error = %e,
                cause = %cause,
                "Failed to revert status after scheduling failure"
            ),
        }
    }
}

/// Reject zero quantities, then merge repeated products keeping first-seen order
fn merge_lines(items: &[LineItemRequest]) -> Result<Vec<LineItemRequest>, OrderError> {
    let mut merged: Vec<LineItemRequest> = Vec::with_capacity(items.len());
    let mut positions: HashMap<Uuid, usize> = HashMap::new();

    for item in items {
        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                pharmacy_product_id: item.pharmacy_product_id,
            });
        }
        match positions.get(&item.pharmacy_product_id) {
            Some(&index) => {
                let line = &mut merged[index];
                line.quantity = line.quantity.saturating_add(item.quantity);
            }
            None => {
                positions.insert(item.pharmacy_product_id, merged.len());
                merged.push(*item);
            }
        }
    }
    Ok(merged)
}

fn transition_error(order_id: Uuid, target: OrderStatus, error: StateMachineError) -> OrderError {
    match error {
        StateMachineError::ConcurrentModification {
            expected, actual, ..
        } => OrderError::ConcurrentStatusChange {
            order_id,
            expected,
            actual,
        },
        StateMachineError::OrderNotFound { order_id } => OrderError::OrderNotFound { order_id },
        StateMachineError::GuardFailed(guard) => {
            debug!(order_id = %order_id, error = %guard, "Transition rejected by guard");
            OrderError::InvalidStatusTransition {
                order_id,
                from: guard.from_state(),
                to: target,
            }
        }
        StateMachineError::Persistence(e) => OrderError::Store(e),
    }
}
