//! Error types for the pool.

use thiserror::Error;

/// Result type for pool operations.
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// A single configuration field validation failure.
#[derive(Debug, Clone)]
pub struct FieldViolation {
    /// The field name (e.g. "max_idle").
    pub field: String,
    /// The constraint that was violated (e.g. "must be >= -1").
    pub constraint: String,
    /// The actual value that failed (as a string representation).
    pub actual: String,
}

impl FieldViolation {
    /// Create a new field violation.
    pub fn new(
        field: impl Into<String>,
        constraint: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
            actual: actual.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (got {})",
            self.field, self.constraint, self.actual
        )
    }
}

/// Error taxonomy for pool operations (spec §7).
#[derive(Error, Debug)]
pub enum PoolError {
    /// Operation attempted on a closed pool.
    #[error("pool is closed")]
    Closed,

    /// `Fail` exhaustion policy with no idle record and the cap reached,
    /// or a `Block` wait that timed out.
    #[error("no element available in the pool")]
    NoSuchElement,

    /// Caller attempted to return or otherwise use an instance the pool
    /// no longer considers borrowed.
    #[error("borrow is no longer valid")]
    InvalidBorrow,

    /// A blocked borrow was cancelled before an instance became available.
    #[error("borrow was interrupted")]
    Interrupted,

    /// The factory failed during `create`, `activate`, `validate`,
    /// or `passivate`.
    #[error("factory operation failed: {0}")]
    Factory(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Misuse: double-return, return to the wrong pool, or an otherwise
    /// illegal state transition.
    #[error("illegal pool state: {0}")]
    IllegalState(String),

    /// The configuration snapshot failed validation.
    #[error("invalid pool configuration: {violations:?}")]
    Configuration {
        /// Individual field violations.
        violations: Vec<FieldViolation>,
    },
}

impl PoolError {
    /// Build a [`PoolError::Configuration`] from a single violation.
    pub fn configuration(
        field: impl Into<String>,
        constraint: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            violations: vec![FieldViolation::new(field, constraint, actual)],
        }
    }

    /// Build a [`PoolError::Configuration`] from a batch of violations.
    #[must_use]
    pub fn validation(violations: Vec<FieldViolation>) -> Self {
        Self::Configuration { violations }
    }

    /// Wrap a factory error.
    pub fn factory<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Factory(Box::new(source))
    }

    /// Whether a caller can reasonably retry the operation that produced
    /// this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoSuchElement | Self::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn closed_is_not_retryable() {
        assert!(!PoolError::Closed.is_retryable());
    }

    #[test]
    fn no_such_element_is_retryable() {
        assert!(PoolError::NoSuchElement.is_retryable());
    }

    #[test]
    fn interrupted_is_retryable() {
        assert!(PoolError::Interrupted.is_retryable());
    }

    #[test]
    fn illegal_state_is_not_retryable() {
        assert!(!PoolError::IllegalState("double return".into()).is_retryable());
    }

    #[test]
    fn factory_wraps_source() {
        let err = PoolError::factory(Boom);
        assert!(err.to_string().contains("boom"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn configuration_display_lists_violations() {
        let err = PoolError::validation(vec![
            FieldViolation::new("max_idle", "must be >= -1", "-5"),
            FieldViolation::new("min_idle", "must be <= max_idle", "100"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("max_idle"));
        assert!(msg.contains("min_idle"));
    }

    #[test]
    fn field_violation_display() {
        let v = FieldViolation::new("max_total", "must be >= -1", "-2");
        assert_eq!(v.to_string(), "max_total: must be >= -1 (got -2)");
    }
}
