//! # Order Store
//!
//! Persistence seam for the order aggregate. The engine behind it is opaque;
//! what the lifecycle needs from it is a small set of conditional writes that
//! make concurrent status changes and proof uploads safe without locks held
//! across await points.

pub mod in_memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::Order;
use crate::state_machine::OrderStatus;

pub use in_memory::InMemoryOrderStore;

/// Result of a conditional status write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The order was in the expected status and now holds the target status
    Applied(Order),
    /// The order exists but was in a different status; nothing was written
    Mismatch { actual: OrderStatus },
    /// No live order with that id
    NotFound,
}

/// Result of a conditional payment proof write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofUpdate {
    Attached(Order),
    /// A proof is already present; the existing reference is untouched
    AlreadyUploaded { existing: String },
    /// The order no longer waits for payment
    NotWaiting { status: OrderStatus },
    NotFound,
}

/// Transactional order storage
///
/// Lookups of soft-deleted orders return them (callers decide), but
/// conditional writes treat soft-deleted orders as missing.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a newly placed order
    ///
    /// Fails with `DuplicateVoiceNumber` if another order holds the same invoice code.
    async fn insert(&self, order: Order) -> Result<(), StoreError>;

    async fn find(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Compare-and-swap on status; bumps `updated_at` when applied
    async fn update_status_if(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        target: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusUpdate, StoreError>;

    /// Attach a payment proof if none exists and the order is still `WAITING`
    async fn attach_payment_proof_if_absent(
        &self,
        order_id: Uuid,
        proof_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<ProofUpdate, StoreError>;

    /// Remove the payment proof only if it still equals `proof_ref`
    ///
    /// Returns whether anything was cleared.
    async fn clear_payment_proof_if(
        &self,
        order_id: Uuid,
        proof_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Mark an order deleted; returns false if it was missing or already deleted
    async fn soft_delete(&self, order_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
}
