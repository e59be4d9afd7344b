//! Search index maintenance for catalog writes

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::HandlerError;
use crate::indexing::{ProductDocument, ProductIndex};
use crate::worker::router::{HandlerOutcome, HandlerResult, TaskHandler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexJob {
    Create(ProductDocument),
    Update(ProductDocument),
}

impl IndexJob {
    pub fn document(&self) -> &ProductDocument {
        match self {
            Self::Create(document) | Self::Update(document) => document,
        }
    }

    fn into_document(self) -> ProductDocument {
        match self {
            Self::Create(document) | Self::Update(document) => document,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
        }
    }
}

pub struct ProductIndexHandler {
    index: Arc<dyn ProductIndex>,
}

impl ProductIndexHandler {
    pub fn new(index: Arc<dyn ProductIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl TaskHandler for ProductIndexHandler {
    type Payload = IndexJob;

    fn name(&self) -> &'static str {
        "product_index"
    }

    /// Upserts are keyed by product id, so create and update both converge
    /// on the latest document regardless of redelivery.
    async fn handle(&self, job: IndexJob) -> HandlerResult {
        if job.document().name.trim().is_empty() {
            return Err(HandlerError::permanent(format!(
                "product {} has no name to index",
                job.document().product_id
            )));
        }

        let operation = job.operation();
        let product_id = job.document().product_id;
        self.index.upsert(job.into_document()).await?;

        tracing::debug!(product_id = %product_id, operation = operation, "Product indexed");
        Ok(HandlerOutcome::Completed)
    }
}
