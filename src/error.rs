//! Error types for the loading engine.

use thiserror::Error;

/// Result type alias for run-level operations.
pub type Result<T> = std::result::Result<T, PackingError>;

/// Run-level failures and outcomes.
///
/// Boxes that find no feasible position are not errors; they end up in the
/// unplaced list of the result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackingError {
    /// Rejected input data (dimensions, weights, rotation ids, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A box carries a constraint field whose flag is disabled.
    #[error("Box '{box_id}' sets '{field}' but '{flag}' is disabled")]
    ConstraintFieldWithoutFlag {
        box_id: String,
        field: &'static str,
        flag: &'static str,
    },

    /// The cancellation token was observed.
    #[error("Calculation cancelled")]
    Cancelled,
}

impl PackingError {
    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PackingError::InvalidInput(_) => "invalid_input",
            PackingError::ConstraintFieldWithoutFlag { .. } => "constraint_field_without_flag",
            PackingError::Cancelled => "cancelled",
        }
    }
}

/// Failures of the exact-solver collaborator.
///
/// Never surfaced to callers: the hybrid strategy falls back to greedy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// No solver backend is available.
    #[error("Exact solver unavailable")]
    Unavailable,

    /// No solution within the time budget.
    #[error("Exact solver found no solution within {0}ms")]
    Timeout(u64),

    /// The backend failed or returned an unusable answer.
    #[error("Exact solver failed: {0}")]
    Failed(String),
}
