//! Handlers for every task kind
//!
//! Handlers must be idempotent: the broker delivers at least once, so each
//! handler re-reads current state and treats "already done" as success.

pub mod mail;
pub mod order;
pub mod product_index;

pub use mail::{MailHandler, MailJob};
pub use order::{AutoConfirmOrdersHandler, AutoProcessOrderHandler};
pub use product_index::{IndexJob, ProductIndexHandler};
