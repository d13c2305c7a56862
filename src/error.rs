//! Plan error types

use thiserror::Error;

/// Errors produced while rewriting logical plans
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    /// A column reference could not be located in the child schema
    /// after a structural change
    #[error("table not found: '{table}', column: '{column}'")]
    ColumnTableNotFound { table: String, column: String },

    /// A projected column of a subquery alias has no match in the
    /// subquery's own schema
    #[error("this is likely a bug: missing projected column '{column}' on subquery '{subquery}'")]
    MissingProjectedColumn { column: String, subquery: String },

    /// Malformed plan structure (wrong child arity, etc.)
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// A source rejected or failed to build a restricted source
    #[error("source error: {0}")]
    Source(String),
}

/// Result type for plan rewrites
pub type PlanResult<T> = Result<T, PlanError>;
