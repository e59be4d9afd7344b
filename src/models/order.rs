//! # Order Model
//!
//! The order aggregate: an order, its line items and its status.
//!
//! ## Overview
//!
//! An `Order` is created at checkout in `WAITING` status and owns its
//! `OrderProduct` lines. Line prices are snapshots of the catalog price at
//! purchase time and never change afterwards. Totals are derived from the
//! lines with exact decimal arithmetic.
//!
//! ## Key Features
//!
//! - **Exact Money**: every amount is a `rust_decimal::Decimal`
//! - **Price Snapshots**: line prices are immutable after creation
//! - **Soft Delete**: `deleted_at` marks an order as removed without losing history
//! - **Voice Numbers**: unique human-readable invoice codes with a brand prefix
//!
//! Status changes never happen through this type directly outside of the
//! store's conditional writes; see `state_machine::OrderStateMachine`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::system::VOICE_NUMBER_RANDOM_LEN;
use crate::state_machine::OrderStatus;

/// An order line: one pharmacy product at a fixed unit price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProduct {
    pub order_id: Uuid,
    pub pharmacy_product_id: Uuid,
    pub quantity: u32,
    /// Unit price snapshot taken at checkout
    pub price: Decimal,
}

impl OrderProduct {
    /// `price * quantity`
    pub fn subtotal(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// A requested line at checkout, before pricing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub pharmacy_product_id: Uuid,
    pub quantity: u32,
}

/// A line that has been validated and priced against the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub pharmacy_product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Order aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total_product_price: Decimal,
    pub ship_cost: Decimal,
    pub total_payment: Decimal,
    pub payment_proof_url: Option<String>,
    pub voice_number: String,
    pub products: Vec<OrderProduct>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Build a new `WAITING` order from priced lines
    ///
    /// Totals are computed here; callers are expected to have rejected empty
    /// carts and zero quantities already.
    pub fn place(
        user_id: Uuid,
        lines: &[PricedLine],
        ship_cost: Decimal,
        voice_number: String,
        now: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4();
        let products: Vec<OrderProduct> = lines
            .iter()
            .map(|line| OrderProduct {
                order_id: id,
                pharmacy_product_id: line.pharmacy_product_id,
                quantity: line.quantity,
                price: line.unit_price,
            })
            .collect();

        let total_product_price: Decimal = products.iter().map(OrderProduct::subtotal).sum();

        Self {
            id,
            user_id,
            status: OrderStatus::Waiting,
            total_product_price,
            ship_cost,
            total_payment: total_product_price + ship_cost,
            payment_proof_url: None,
            voice_number,
            products,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn has_payment_proof(&self) -> bool {
        self.payment_proof_url.is_some()
    }

    /// Total quantity across all lines
    pub fn item_count(&self) -> u64 {
        self.products.iter().map(|p| u64::from(p.quantity)).sum()
    }

    /// Recompute the product total from the line snapshots
    pub fn computed_product_total(&self) -> Decimal {
        self.products.iter().map(OrderProduct::subtotal).sum()
    }
}

/// Generate an invoice code: `{PREFIX}-{YYYYMMDD}-{RANDOM}`
///
/// The random part is the first hex characters of a v4 UUID, upper-cased.
/// Uniqueness is enforced by the store; checkout regenerates on collision.
pub fn generate_voice_number(prefix: &str, at: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string().to_uppercase();
    format!(
        "{}-{}-{}",
        prefix,
        at.format("%Y%m%d"),
        &random[..VOICE_NUMBER_RANDOM_LEN]
    )
}
