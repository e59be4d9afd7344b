//! # Product Index Collaborator
//!
//! Side-channel search index for pharmacy products. Catalog writes enqueue
//! index tasks; the low-priority workers push documents here.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Searchable projection of a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDocument {
    pub product_id: Uuid,
    pub name: String,
    pub generic_name: Option<String>,
    pub manufacturer: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("Product index unavailable: {message}")]
    Unavailable { message: String },

    #[error("Product document rejected: {message}")]
    Rejected { message: String },
}

#[async_trait]
pub trait ProductIndex: Send + Sync {
    /// Insert or replace the document keyed by `product_id`
    async fn upsert(&self, document: ProductDocument) -> Result<(), IndexError>;
}

#[derive(Debug, Default)]
pub struct InMemoryProductIndex {
    documents: Mutex<HashMap<Uuid, ProductDocument>>,
    failures: Mutex<VecDeque<IndexError>>,
}

impl InMemoryProductIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: IndexError) {
        self.failures.lock().push_back(error);
    }

    pub fn get(&self, product_id: Uuid) -> Option<ProductDocument> {
        self.documents.lock().get(&product_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }
}

#[async_trait]
impl ProductIndex for InMemoryProductIndex {
    async fn upsert(&self, document: ProductDocument) -> Result<(), IndexError> {
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        self.documents.lock().insert(document.product_id, document);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(name: &str) -> ProductDocument {
        ProductDocument {
            product_id: Uuid::new_v4(),
            name: name.to_string(),
            generic_name: None,
            manufacturer: None,
            category: Some("analgesic".to_string()),
            price: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_product_id() {
        let index = InMemoryProductIndex::new();
        let mut doc = document("Paracetamol 500mg");
        index.upsert(doc.clone()).await.unwrap();

        doc.name = "Paracetamol 500mg Tablet".to_string();
        index.upsert(doc.clone()).await.unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(doc.product_id), Some(doc));
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let index = InMemoryProductIndex::new();
        index.fail_next(IndexError::Unavailable {
            message: "503".to_string(),
        });
        assert!(index.upsert(document("Ibuprofen")).await.is_err());
        assert!(index.upsert(document("Ibuprofen")).await.is_ok());
    }
}
