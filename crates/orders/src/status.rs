use serde::{Deserialize, Serialize};

use evento_core::{DomainError, DomainResult};

/// Lifecycle of a single order placement attempt.
///
/// `Requested → Reserving → Debiting → Committed` on success; any
/// non-terminal state may move to `Aborted`. Only `Committed` attempts leave a
/// row behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Requested,
    Reserving,
    Debiting,
    Committed,
    Aborted,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Committed | OrderStatus::Aborted)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Requested, Reserving)
                | (Reserving, Debiting)
                | (Debiting, Committed)
                | (Requested, Aborted)
                | (Reserving, Aborted)
                | (Debiting, Aborted)
        )
    }

    pub fn transition(self, next: OrderStatus) -> DomainResult<OrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::invariant(format!(
                "illegal order transition {self:?} -> {next:?}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_path_is_linear() {
        let s = OrderStatus::Requested
            .transition(OrderStatus::Reserving)
            .and_then(|s| s.transition(OrderStatus::Debiting))
            .and_then(|s| s.transition(OrderStatus::Committed))
            .unwrap();
        assert_eq!(s, OrderStatus::Committed);
        assert!(s.is_terminal());
    }

    #[test]
    fn every_live_state_can_abort() {
        for s in [OrderStatus::Requested, OrderStatus::Reserving, OrderStatus::Debiting] {
            assert_eq!(s.transition(OrderStatus::Aborted), Ok(OrderStatus::Aborted));
        }
    }

    #[test]
    fn terminal_states_are_final_and_steps_cannot_be_skipped() {
        assert!(OrderStatus::Committed.transition(OrderStatus::Aborted).is_err());
        assert!(OrderStatus::Aborted.transition(OrderStatus::Reserving).is_err());
        assert!(OrderStatus::Requested.transition(OrderStatus::Committed).is_err());
        assert!(OrderStatus::Reserving.transition(OrderStatus::Committed).is_err());
    }
}
