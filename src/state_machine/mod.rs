// Order status state machine
//
// Statuses, the legal transition graph, and the compare-and-swap transition
// executor used by both user-facing use cases and background task handlers.

pub mod errors;
pub mod guards;
pub mod order_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use errors::{GuardError, GuardResult, StateMachineError, StateMachineResult};
pub use guards::{is_valid_transition, is_valid_transition_str, TransitionGuard};
pub use order_state_machine::OrderStateMachine;
pub use states::OrderStatus;
