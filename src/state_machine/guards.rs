use super::errors::{GuardError, GuardResult};
use super::states::OrderStatus;

/// Check whether `current -> target` is an edge of the legal status graph
///
/// ```text
/// WAITING   -> PROCESSED | CANCELLED
/// PROCESSED -> SENT | CANCELLED
/// SENT      -> CONFIRMED | PROCESSED (roll back)
/// CONFIRMED -> SENT (reopen)
/// CANCELLED -> (terminal)
/// ```
///
/// Pure and total. Self transitions are not edges.
pub fn is_valid_transition(current: OrderStatus, target: OrderStatus) -> bool {
    use OrderStatus::*;

    matches!(
        (current, target),
        (Waiting, Processed)
            | (Processed, Sent)
            | (Sent, Confirmed)
            | (Sent, Processed)
            | (Confirmed, Sent)
            | (Waiting, Cancelled)
            | (Processed, Cancelled)
    )
}

/// String-level variant for values read from untyped sources
///
/// Unknown status names fail closed.
pub fn is_valid_transition_str(current: &str, target: &str) -> bool {
    match (current.parse::<OrderStatus>(), target.parse::<OrderStatus>()) {
        (Ok(current), Ok(target)) => is_valid_transition(current, target),
        _ => false,
    }
}

/// Guard conditions for order status transitions
#[derive(Debug)]
pub struct TransitionGuard;

impl TransitionGuard {
    /// Check if a transition is valid, explaining why when it is not
    pub fn can_transition(from: OrderStatus, to: OrderStatus) -> GuardResult<()> {
        if from.is_terminal() {
            return Err(GuardError::TerminalState { state: from });
        }

        if is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(GuardError::IllegalEdge { from, to })
        }
    }

    /// Legal successors of a status
    pub fn successors(from: OrderStatus) -> Vec<OrderStatus> {
        OrderStatus::ALL
            .into_iter()
            .filter(|to| is_valid_transition(from, *to))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::build_order_transition_map;
    use OrderStatus::*;

    #[test]
    fn test_forward_path_is_legal() {
        assert!(is_valid_transition(Waiting, Processed));
        assert!(is_valid_transition(Processed, Sent));
        assert!(is_valid_transition(Sent, Confirmed));
    }

    #[test]
    fn test_roll_back_and_reopen() {
        assert!(is_valid_transition(Sent, Processed));
        assert!(is_valid_transition(Confirmed, Sent));
        assert!(!is_valid_transition(Confirmed, Processed));
        assert!(!is_valid_transition(Processed, Waiting));
    }

    #[test]
    fn test_cancellation_only_before_shipping() {
        assert!(is_valid_transition(Waiting, Cancelled));
        assert!(is_valid_transition(Processed, Cancelled));
        assert!(!is_valid_transition(Sent, Cancelled));
        assert!(!is_valid_transition(Confirmed, Cancelled));
    }

    #[test]
    fn test_cancelled_is_terminal() {
        for target in OrderStatus::ALL {
            assert!(!is_valid_transition(Cancelled, target));
        }
        assert!(matches!(
            TransitionGuard::can_transition(Cancelled, Waiting),
            Err(GuardError::TerminalState { .. })
        ));
    }

    #[test]
    fn test_self_transitions_are_rejected() {
        for status in OrderStatus::ALL {
            assert!(!is_valid_transition(status, status));
        }
    }

    #[test]
    fn test_unknown_strings_fail_closed() {
        assert!(is_valid_transition_str("WAITING", "PROCESSED"));
        assert!(!is_valid_transition_str("PAID", "PROCESSED"));
        assert!(!is_valid_transition_str("WAITING", ""));
    }

    #[test]
    fn test_validator_matches_transition_event_map() {
        let map = build_order_transition_map();
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    is_valid_transition(from, to),
                    map.contains_key(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_successors() {
        assert_eq!(TransitionGuard::successors(Sent), vec![Processed, Confirmed]);
        assert!(TransitionGuard::successors(Cancelled).is_empty());
    }
}
