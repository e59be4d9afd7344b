//! Shared fixtures for integration tests

#![allow(dead_code)] // Each test binary uses a different subset

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use orderflow_core::catalog::InMemoryCatalog;
use orderflow_core::config::{BackoffConfig, OrdersConfig, QueueWeights};
use orderflow_core::indexing::InMemoryProductIndex;
use orderflow_core::messaging::{BackoffCalculator, InMemoryTaskBroker};
use orderflow_core::models::{LineItemRequest, Order};
use orderflow_core::notification::InMemoryNotifier;
use orderflow_core::services::{CheckoutRequest, OrderService};
use orderflow_core::store::InMemoryOrderStore;
use orderflow_core::tasks::{TaskEnqueuer, TaskPolicies};
use orderflow_core::worker::{TaskRouter, WorkerPool, WorkerPoolConfig, WorkerPoolHandle};

/// Deterministic backoff: 1s, 2s, 4s ... without jitter
pub fn fixed_backoff() -> BackoffCalculator {
    BackoffCalculator::new(BackoffConfig {
        jitter_enabled: false,
        ..BackoffConfig::default()
    })
}

pub fn test_broker() -> Arc<InMemoryTaskBroker> {
    Arc::new(InMemoryTaskBroker::new(Duration::from_secs(5), fixed_backoff()))
}

/// Pool settings that keep paused-clock tests from spinning through long delays
pub fn pool_config(concurrency: usize) -> WorkerPoolConfig {
    WorkerPoolConfig {
        concurrency,
        queue_weights: QueueWeights::default(),
        poll_interval: Duration::from_secs(1),
        max_idle_wait: Duration::from_secs(3_600),
        shutdown_grace: Duration::from_secs(30),
    }
}

/// Every collaborator in memory, wired the way the worker binary wires them
pub struct Harness {
    pub store: Arc<InMemoryOrderStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub broker: Arc<InMemoryTaskBroker>,
    pub notifier: Arc<InMemoryNotifier>,
    pub index: Arc<InMemoryProductIndex>,
    pub tasks: TaskEnqueuer,
    pub service: OrderService,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let broker = test_broker();
        let tasks = TaskEnqueuer::new(broker.clone(), TaskPolicies::default());
        let service = OrderService::new(
            store.clone(),
            catalog.clone(),
            tasks.clone(),
            OrdersConfig::default(),
        );
        Self {
            store,
            catalog,
            broker,
            notifier: Arc::new(InMemoryNotifier::new()),
            index: Arc::new(InMemoryProductIndex::new()),
            tasks,
            service,
        }
    }

    pub fn router(&self) -> Arc<TaskRouter> {
        Arc::new(TaskRouter::with_collaborators(
            self.store.clone(),
            self.notifier.clone(),
            self.index.clone(),
        ))
    }

    pub fn start_pool(&self, concurrency: usize) -> WorkerPoolHandle {
        WorkerPool::new(self.broker.clone(), self.router(), pool_config(concurrency))
            .expect("valid pool config")
            .start()
    }

    /// Stock a product and check out `quantity` of it for `user_id`
    pub async fn place_order(&self, user_id: Uuid, quantity: u32) -> (Order, Uuid) {
        let product_id = self.catalog.add_product(dec!(25000), 100);
        let order = self
            .service
            .checkout(user_id, checkout(&[(product_id, quantity)], dec!(10000)))
            .await
            .expect("checkout succeeds");
        (order, product_id)
    }

    pub async fn status_of(&self, order_id: Uuid) -> orderflow_core::OrderStatus {
        use orderflow_core::store::OrderStore;
        self.store
            .find(order_id)
            .await
            .expect("store available")
            .expect("order exists")
            .status
    }
}

pub fn checkout(lines: &[(Uuid, u32)], ship_cost: Decimal) -> CheckoutRequest {
    CheckoutRequest {
        items: lines
            .iter()
            .map(|&(pharmacy_product_id, quantity)| LineItemRequest {
                pharmacy_product_id,
                quantity,
            })
            .collect(),
        ship_cost,
    }
}
