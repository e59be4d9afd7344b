use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{CatalogService, ProductAvailability};
use crate::errors::CatalogError;
use crate::models::LineItemRequest;

/// In-memory catalog with all-or-nothing reservations
///
/// A single mutex guards every product so a multi-line reservation is checked
/// and applied as one step.
#[derive(Debug)]
pub struct InMemoryCatalog {
    products: Mutex<HashMap<Uuid, ProductAvailability>>,
    available: AtomicBool,
    fail_releases: AtomicBool,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            products: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            fail_releases: AtomicBool::new(false),
        }
    }

    /// Register an active product of an active pharmacy; returns its id
    pub fn add_product(&self, price: Decimal, stock: u32) -> Uuid {
        let product = ProductAvailability {
            pharmacy_product_id: Uuid::new_v4(),
            pharmacy_id: Uuid::new_v4(),
            price,
            stock,
            product_active: true,
            pharmacy_active: true,
        };
        let id = product.pharmacy_product_id;
        self.upsert(product);
        id
    }

    pub fn upsert(&self, product: ProductAvailability) {
        self.products
            .lock()
            .insert(product.pharmacy_product_id, product);
    }

    pub fn set_product_active(&self, pharmacy_product_id: Uuid, active: bool) {
        if let Some(product) = self.products.lock().get_mut(&pharmacy_product_id) {
            product.product_active = active;
        }
    }

    pub fn set_pharmacy_active(&self, pharmacy_product_id: Uuid, active: bool) {
        if let Some(product) = self.products.lock().get_mut(&pharmacy_product_id) {
            product.pharmacy_active = active;
        }
    }

    pub fn set_price(&self, pharmacy_product_id: Uuid, price: Decimal) {
        if let Some(product) = self.products.lock().get_mut(&pharmacy_product_id) {
            product.price = price;
        }
    }

    pub fn stock_of(&self, pharmacy_product_id: Uuid) -> Option<u32> {
        self.products
            .lock()
            .get(&pharmacy_product_id)
            .map(|product| product.stock)
    }

    /// Fail every call with `CatalogError::Unavailable` while false
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Fail only `release` calls while true
    pub fn set_fail_releases(&self, fail: bool) {
        self.fail_releases.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CatalogError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CatalogError::Unavailable {
                message: "in-memory catalog marked unavailable".to_string(),
            })
        }
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalog {
    async fn availability(
        &self,
        pharmacy_product_id: Uuid,
    ) -> Result<Option<ProductAvailability>, CatalogError> {
        self.check_available()?;
        Ok(self.products.lock().get(&pharmacy_product_id).cloned())
    }

    async fn reserve(&self, lines: &[LineItemRequest]) -> Result<(), CatalogError> {
        self.check_available()?;

        let mut products = self.products.lock();
        for line in lines {
            let product = products.get(&line.pharmacy_product_id).ok_or(
                CatalogError::ProductNotFound {
                    pharmacy_product_id: line.pharmacy_product_id,
                },
            )?;
            if product.stock < line.quantity {
                return Err(CatalogError::InsufficientStock {
                    pharmacy_product_id: line.pharmacy_product_id,
                    requested: line.quantity,
                    available: product.stock,
                });
            }
        }

        for line in lines {
            if let Some(product) = products.get_mut(&line.pharmacy_product_id) {
                product.stock -= line.quantity;
            }
        }
        Ok(())
    }

    async fn release(&self, lines: &[LineItemRequest]) -> Result<(), CatalogError> {
        self.check_available()?;
        if self.fail_releases.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable {
                message: "stock release rejected".to_string(),
            });
        }

        let mut products = self.products.lock();
        for line in lines {
            if let Some(product) = products.get_mut(&line.pharmacy_product_id) {
                product.stock = product.stock.saturating_add(line.quantity);
            }
        }
        Ok(())
    }
}
