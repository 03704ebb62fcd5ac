//! Allocation error types.

use ccalloc_core::CoreError;
use thiserror::Error;

/// Error type for allocation runs.
///
/// Every variant is fatal: the run is aborted and no ledger is returned.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// A cycle contains no edge that the service precedence list allows to remove.
    #[error("Unbreakable cost allocation cycle: {cycle}")]
    AmbiguousCycle {
        /// Instances along the cycle, e.g. `a.a,b.b,a.a`.
        cycle: String,
    },

    /// Cycles remain after the maximum number of edge removals.
    #[error("Maximum number of cost allocation cycle breaks ({max_breaks}) was reached")]
    CycleBreakLimitExceeded {
        /// The configured bound.
        max_breaks: usize,
    },

    /// Two cost items carry different currencies.
    #[error("Found cost items with different currencies: {expected} and {found}")]
    CurrencyMismatch {
        /// Reference currency (first non-empty one).
        expected: String,
        /// Conflicting currency.
        found: String,
    },

    /// A cycle was found after cycle breaking; indicates an internal inconsistency.
    #[error("Found unexpected cost allocation cycle: {cycle}")]
    UnexpectedCycle {
        /// Instances left unordered.
        cycle: String,
    },

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl AllocationError {
    /// Returns true if the error is caused by the cost allocation graph shape.
    pub fn is_cycle_error(&self) -> bool {
        matches!(
            self,
            AllocationError::AmbiguousCycle { .. }
                | AllocationError::CycleBreakLimitExceeded { .. }
                | AllocationError::UnexpectedCycle { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AllocationError::AmbiguousCycle {
            cycle: "a.a,b.b,a.a".to_string(),
        };
        assert_eq!(err.to_string(), "Unbreakable cost allocation cycle: a.a,b.b,a.a");
        assert!(err.is_cycle_error());

        let err = AllocationError::CurrencyMismatch {
            expected: "EUR".to_string(),
            found: "USD".to_string(),
        };
        assert!(err.to_string().contains("EUR and USD"));
        assert!(!err.is_cycle_error());
    }
}
