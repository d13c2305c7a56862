//! relplan - logical plan optimization core for a SQL execution engine
//!
//! Takes a resolved relational plan and produces a semantically
//! equivalent plan with unused columns pruned, filter predicates
//! relocated as close to the sources as possible, compatible work
//! pushed into capability-advertising sources, and index lookups
//! selected for indexable predicates.
//!
//! ## Pipeline
//!
//! ```text
//! LogicalPlan (resolved)
//!   → Analyzer::analyze()
//!       prune_columns → pushdown_projections → pushdown_filters
//!   → LogicalPlan (optimized, same root schema)
//! ```

pub mod analyzer;
pub mod catalog;
pub mod error;
pub mod plan;
pub mod source;

pub use analyzer::{Analyzer, Context, Rule, Scope};
pub use error::{PlanError, PlanResult};
pub use plan::LogicalPlan;
