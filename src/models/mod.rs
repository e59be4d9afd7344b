pub mod order;

// Re-export core models for easy access
pub use order::{generate_voice_number, LineItemRequest, Order, OrderProduct, PricedLine};
