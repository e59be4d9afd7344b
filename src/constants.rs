//! # System Constants
//!
//! Core constants that define the operational boundaries of the order
//! lifecycle: lifecycle event names, task type identifiers, status groupings
//! and the transition-to-event map used for structured logging.

use std::collections::HashMap;

pub use crate::state_machine::OrderStatus;

/// Lifecycle events emitted (as log records) when an order changes status
pub mod events {
    pub const ORDER_PLACED: &str = "order.placed";
    pub const ORDER_PAYMENT_PROOF_ATTACHED: &str = "order.payment_proof_attached";
    pub const ORDER_PROCESSED: &str = "order.processed";
    pub const ORDER_SENT: &str = "order.sent";
    pub const ORDER_CONFIRMED: &str = "order.confirmed";
    pub const ORDER_ROLLED_BACK: &str = "order.rolled_back";
    pub const ORDER_REOPENED: &str = "order.reopened";
    pub const ORDER_CANCELLED: &str = "order.cancelled";
}

/// Stable task type identifiers stored alongside serialized payloads
pub mod task_types {
    pub const SEND_VERIFICATION_EMAIL: &str = "email:verification";
    pub const SEND_PASSWORD_RESET_EMAIL: &str = "email:password_reset";
    pub const SEND_PHARMACIST_ACCOUNT_EMAIL: &str = "email:pharmacist_account";
    pub const AUTO_PROCESS_ORDER: &str = "order:auto_process";
    pub const AUTO_CONFIRM_ORDERS: &str = "order:auto_confirm";
    pub const CREATE_PRODUCT: &str = "product:create";
    pub const UPDATE_PRODUCT: &str = "product:update";
}

/// System-wide constants
pub mod system {
    /// Default brand tag prefixed to generated voice numbers
    pub const DEFAULT_VOICE_NUMBER_PREFIX: &str = "MEDS";

    /// Number of random hex characters in a voice number
    pub const VOICE_NUMBER_RANDOM_LEN: usize = 10;

    /// Default total worker concurrency
    pub const DEFAULT_WORKER_CONCURRENCY: usize = 10;

    /// Default relative weights for (critical, default, low)
    pub const DEFAULT_QUEUE_WEIGHTS: (u32, u32, u32) = (6, 3, 1);

    /// Longest a task may be scheduled ahead (one year)
    pub const MAX_TASK_DELAY_SECONDS: u64 = 366 * 24 * 60 * 60;

    /// Longest a single handler execution may run (one day)
    pub const MAX_TASK_TIMEOUT_SECONDS: u64 = 24 * 60 * 60;

    /// Longest retry backoff (one day)
    pub const MAX_BACKOFF_DELAY_SECONDS: f64 = 86_400.0;
}

/// Status groupings for validation and logic
pub mod status_groups {
    use super::OrderStatus;

    /// Statuses from which an order may still be cancelled
    pub const CANCELLABLE_STATES: &[OrderStatus] = &[OrderStatus::Waiting, OrderStatus::Processed];

    /// Statuses with no outgoing transitions
    pub const TERMINAL_STATES: &[OrderStatus] = &[OrderStatus::Cancelled];

    /// Statuses in which goods have physically left the pharmacy
    pub const SHIPPED_STATES: &[OrderStatus] = &[OrderStatus::Sent, OrderStatus::Confirmed];
}

pub type OrderTransitionKey = (OrderStatus, OrderStatus);
pub type OrderTransitionMap = HashMap<OrderTransitionKey, &'static str>;

/// Build the map of legal order transitions to their lifecycle event
///
/// Every key of this map is a legal transition and every legal transition is
/// a key; `state_machine::guards` tests hold the two in lockstep.
pub fn build_order_transition_map() -> OrderTransitionMap {
    let mut map = HashMap::new();

    map.insert(
        (OrderStatus::Waiting, OrderStatus::Processed),
        events::ORDER_PROCESSED,
    );
    map.insert(
        (OrderStatus::Processed, OrderStatus::Sent),
        events::ORDER_SENT,
    );
    map.insert(
        (OrderStatus::Sent, OrderStatus::Confirmed),
        events::ORDER_CONFIRMED,
    );

    // Pharmacist roll back before confirmation, and the reopen window
    map.insert(
        (OrderStatus::Sent, OrderStatus::Processed),
        events::ORDER_ROLLED_BACK,
    );
    map.insert(
        (OrderStatus::Confirmed, OrderStatus::Sent),
        events::ORDER_REOPENED,
    );

    map.insert(
        (OrderStatus::Waiting, OrderStatus::Cancelled),
        events::ORDER_CANCELLED,
    );
    map.insert(
        (OrderStatus::Processed, OrderStatus::Cancelled),
        events::ORDER_CANCELLED,
    );

    map
}

/// Lifecycle event name for a transition, if the transition is legal
pub fn transition_event(from: OrderStatus, to: OrderStatus) -> Option<&'static str> {
    build_order_transition_map().get(&(from, to)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellable_states_are_not_shipped() {
        for status in status_groups::CANCELLABLE_STATES {
            assert!(!status_groups::SHIPPED_STATES.contains(status));
        }
    }

    #[test]
    fn test_transition_event_lookup() {
        assert_eq!(
            transition_event(OrderStatus::Confirmed, OrderStatus::Sent),
            Some(events::ORDER_REOPENED)
        );
        assert_eq!(
            transition_event(OrderStatus::Cancelled, OrderStatus::Waiting),
            None
        );
    }

    #[test]
    fn test_event_names_are_unique_and_namespaced() {
        let names = [
            events::ORDER_PLACED,
            events::ORDER_PAYMENT_PROOF_ATTACHED,
            events::ORDER_PROCESSED,
            events::ORDER_SENT,
            events::ORDER_CONFIRMED,
            events::ORDER_ROLLED_BACK,
            events::ORDER_REOPENED,
            events::ORDER_CANCELLED,
        ];
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert!(names.iter().all(|name| name.starts_with("order.")));
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        let map = build_order_transition_map();
        for terminal in status_groups::TERMINAL_STATES {
            assert!(map.keys().all(|(from, _)| from != terminal));
        }
    }
}
