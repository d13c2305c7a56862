//! Plan analyzer
//!
//! Applies an ordered list of named rewrite rules to a resolved
//! logical plan. Every rule is semantics-preserving: the output plan
//! produces the same rows as the input. Rules check the resolution
//! gate themselves and return unresolved plans unchanged.
//!
//! ## Pipeline
//!
//! ```text
//! LogicalPlan (resolved)
//!   → prune_columns          (drop unused projection/group columns)
//!   → pushdown_projections   (projected access into capable sources)
//!   → pushdown_filters       (filter relocation, filtered access,
//!                             index selection)
//! ```

pub mod fix_indexes;
pub mod prune_columns;
pub mod pushdown;

pub use fix_indexes::fix_field_indexes;
pub use prune_columns::prune_columns;
pub use pushdown::{pushdown_filters, pushdown_projections};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::PlanResult;
use crate::plan::LogicalPlan;

/// Optimization context
///
/// Carries the cancellation signal. Cancellation is sticky and is
/// observed between rules only, never mid-rule.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// Create a new context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sticky cancellation flag
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check the cancellation flag
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Tracks descent depth through subquery aliases
#[derive(Debug, Clone, Copy, Default)]
pub struct Scope {
    depth: usize,
}

impl Scope {
    /// The top-level scope
    pub fn root() -> Self {
        Self::default()
    }

    /// One level deeper
    #[must_use]
    pub fn descend(&self) -> Scope {
        Scope {
            depth: self.depth + 1,
        }
    }

    /// Current depth (0 at the top level)
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// A rewrite rule function
pub type RuleFn = fn(&Context, &Analyzer, LogicalPlan, &Scope) -> PlanResult<LogicalPlan>;

/// A named rewrite rule
#[derive(Clone)]
pub struct Rule {
    /// Rule name, usable for selection via [`Analyzer::rule`]
    pub name: &'static str,
    /// The rule function
    pub apply: RuleFn,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

/// Plan analyzer applying a sequence of rewrite rules
pub struct Analyzer {
    rules: Vec<Rule>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    /// Create an analyzer with the default rule pipeline
    pub fn new() -> Self {
        Self {
            rules: vec![
                Rule {
                    name: "prune_columns",
                    apply: prune_columns,
                },
                Rule {
                    name: "pushdown_projections",
                    apply: pushdown_projections,
                },
                Rule {
                    name: "pushdown_filters",
                    apply: pushdown_filters,
                },
            ],
        }
    }

    /// Create an analyzer with custom rules
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The registered rules, in application order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Look up a single rule by name
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Run the full pipeline over a plan
    ///
    /// A cancelled context stops the pipeline between rules; the plan
    /// rewritten so far is returned (every completed rule preserves
    /// semantics, so a partial result is always valid).
    pub fn analyze(&self, ctx: &Context, plan: LogicalPlan) -> PlanResult<LogicalPlan> {
        let scope = Scope::root();
        let mut plan = plan;
        for rule in &self.rules {
            if ctx.is_cancelled() {
                break;
            }
            plan = (rule.apply)(ctx, self, plan, &scope)?;
        }
        Ok(plan)
    }

    /// Free-form log hook used by the rules
    pub(crate) fn log(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(target: "relplan::analyzer", "{}", args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule_order() {
        let analyzer = Analyzer::new();
        let names: Vec<&str> = analyzer.rules().iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec!["prune_columns", "pushdown_projections", "pushdown_filters"]
        );
    }

    #[test]
    fn test_rule_selection_by_name() {
        let analyzer = Analyzer::new();
        assert!(analyzer.rule("pushdown_filters").is_some());
        assert!(analyzer.rule("no_such_rule").is_none());
    }

    #[test]
    fn test_cancelled_context_stops_pipeline() {
        let analyzer = Analyzer::new();
        let ctx = Context::new();
        ctx.cancel();
        assert!(ctx.is_cancelled());

        let plan = LogicalPlan::unresolved_table("t");
        let out = analyzer.analyze(&ctx, plan).unwrap();
        assert!(matches!(out, LogicalPlan::UnresolvedTable { .. }));
    }
}
