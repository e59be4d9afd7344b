//! # Catalog Collaborator
//!
//! Stock and price lookups for pharmacy products. Checkout reads availability
//! and reserves stock here; cancellation releases it.

pub mod in_memory;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CatalogError;
use crate::models::LineItemRequest;

pub use in_memory::InMemoryCatalog;

/// What checkout needs to know about a pharmacy product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAvailability {
    pub pharmacy_product_id: Uuid,
    pub pharmacy_id: Uuid,
    /// Current unit price; checkout snapshots it into the order line
    pub price: Decimal,
    pub stock: u32,
    pub product_active: bool,
    pub pharmacy_active: bool,
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// `None` when the product does not exist
    async fn availability(
        &self,
        pharmacy_product_id: Uuid,
    ) -> Result<Option<ProductAvailability>, CatalogError>;

    /// Decrement stock for every line or for none of them
    async fn reserve(&self, lines: &[LineItemRequest]) -> Result<(), CatalogError>;

    /// Return previously reserved stock
    async fn release(&self, lines: &[LineItemRequest]) -> Result<(), CatalogError>;
}
