//! In-memory order store
//!
//! Backed by `DashMap` so each conditional write holds a single shard lock
//! for the duration of the compare and the swap. Used by tests and by the
//! standalone worker binary.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{OrderStore, ProofUpdate, StatusUpdate};
use crate::errors::StoreError;
use crate::models::Order;
use crate::state_machine::OrderStatus;

#[derive(Debug)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, Order>,
    voice_numbers: DashMap<String, Uuid>,
    available: AtomicBool,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            voice_numbers: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every call fails with `StoreError::Unavailable` while false
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Overwrite an order as-is, bypassing every condition
    ///
    /// Test fixture helper for arranging states like "sent eight days ago".
    pub fn put(&self, order: Order) {
        self.voice_numbers
            .insert(order.voice_number.clone(), order.id);
        self.orders.insert(order.id, order);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("in-memory store marked unavailable"))
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<(), StoreError> {
        self.check_available()?;

        if self.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateOrder { order_id: order.id });
        }

        match self.voice_numbers.entry(order.voice_number.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::DuplicateVoiceNumber {
                    voice_number: order.voice_number,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(order.id);
            }
        }

        self.orders.insert(order.id, order);
        Ok(())
    }

    async fn find(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        self.check_available()?;
        Ok(self.orders.get(&order_id).map(|entry| entry.value().clone()))
    }

    async fn update_status_if(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        target: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusUpdate, StoreError> {
        self.check_available()?;

        let Some(mut order) = self.orders.get_mut(&order_id) else {
            return Ok(StatusUpdate::NotFound);
        };
        if order.is_deleted() {
            return Ok(StatusUpdate::NotFound);
        }
        if order.status != expected {
            return Ok(StatusUpdate::Mismatch {
                actual: order.status,
            });
        }

        order.status = target;
        order.updated_at = at;
        Ok(StatusUpdate::Applied(order.clone()))
    }

    async fn attach_payment_proof_if_absent(
        &self,
        order_id: Uuid,
        proof_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<ProofUpdate, StoreError> {
        self.check_available()?;

        let Some(mut order) = self.orders.get_mut(&order_id) else {
            return Ok(ProofUpdate::NotFound);
        };
        if order.is_deleted() {
            return Ok(ProofUpdate::NotFound);
        }
        if let Some(existing) = &order.payment_proof_url {
            return Ok(ProofUpdate::AlreadyUploaded {
                existing: existing.clone(),
            });
        }
        if !order.status.awaits_payment() {
            return Ok(ProofUpdate::NotWaiting {
                status: order.status,
            });
        }

        order.payment_proof_url = Some(proof_ref.to_string());
        order.updated_at = at;
        Ok(ProofUpdate::Attached(order.clone()))
    }

    async fn clear_payment_proof_if(
        &self,
        order_id: Uuid,
        proof_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check_available()?;

        let Some(mut order) = self.orders.get_mut(&order_id) else {
            return Ok(false);
        };
        if order.payment_proof_url.as_deref() != Some(proof_ref) {
            return Ok(false);
        }

        order.payment_proof_url = None;
        order.updated_at = at;
        Ok(true)
    }

    async fn soft_delete(&self, order_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.check_available()?;

        let Some(mut order) = self.orders.get_mut(&order_id) else {
            return Ok(false);
        };
        if order.is_deleted() {
            return Ok(false);
        }
        order.deleted_at = Some(at);
        Ok(true)
    }
}
