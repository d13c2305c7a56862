//! Plan explain formatting
//!
//! Formats logical plans as indented trees. Column references are
//! printed with their positional index (`table.name#index`) so the
//! output doubles as a structural fingerprint in tests: two plans with
//! the same explain string agree on shape, expressions, and indices.

use std::fmt::Write;

use crate::plan::LogicalPlan;
use crate::source::Source;

/// Format a logical plan for EXPLAIN output
pub struct ExplainOutput;

impl ExplainOutput {
    /// Format a plan as a string
    pub fn format(plan: &LogicalPlan) -> String {
        let mut output = String::new();
        Self::format_node(plan, 0, &mut output);
        output
    }

    fn format_node(plan: &LogicalPlan, indent: usize, out: &mut String) {
        let prefix = "  ".repeat(indent);

        match plan {
            LogicalPlan::UnresolvedTable { name } => {
                writeln!(out, "{}UnresolvedTable: {}", prefix, name).unwrap();
            }

            LogicalPlan::ResolvedTable { source } => {
                write!(out, "{}Table: {} {}", prefix, source.name(), source.schema()).unwrap();
                if let Some(projection) = source.projection() {
                    write!(out, " projection=[{}]", projection.join(", ")).unwrap();
                }
                if !source.filters().is_empty() {
                    let filters: Vec<String> =
                        source.filters().iter().map(|f| f.describe()).collect();
                    write!(out, " filters=[{}]", filters.join(", ")).unwrap();
                }
                if let Some(lookup) = source.index_lookup() {
                    write!(out, " lookup={}", lookup).unwrap();
                }
                out.push('\n');
            }

            LogicalPlan::Project { expressions, input } => {
                let exprs: Vec<String> = expressions.iter().map(|e| e.describe()).collect();
                writeln!(out, "{}Project: [{}]", prefix, exprs.join(", ")).unwrap();
                Self::format_node(input, indent + 1, out);
            }

            LogicalPlan::GroupBy {
                selected,
                grouping,
                input,
            } => {
                let sel: Vec<String> = selected.iter().map(|e| e.describe()).collect();
                let grp: Vec<String> = grouping.iter().map(|e| e.describe()).collect();
                writeln!(
                    out,
                    "{}GroupBy: [{}] group=[{}]",
                    prefix,
                    sel.join(", "),
                    grp.join(", ")
                )
                .unwrap();
                Self::format_node(input, indent + 1, out);
            }

            LogicalPlan::Filter { predicate, input } => {
                writeln!(out, "{}Filter: {}", prefix, predicate.describe()).unwrap();
                Self::format_node(input, indent + 1, out);
            }

            LogicalPlan::Join {
                join_type,
                condition,
                left,
                right,
            } => {
                write!(out, "{}{}Join", prefix, join_type).unwrap();
                if let Some(cond) = condition {
                    write!(out, ": {}", cond.describe()).unwrap();
                }
                out.push('\n');
                Self::format_node(left, indent + 1, out);
                Self::format_node(right, indent + 1, out);
            }

            LogicalPlan::IndexedJoin {
                join_type,
                condition,
                key_exprs,
                index,
                left,
                right,
            } => {
                let keys: Vec<String> = key_exprs.iter().map(|e| e.describe()).collect();
                writeln!(
                    out,
                    "{}IndexedJoin({}): {} keys=[{}] index={}",
                    prefix,
                    join_type,
                    condition.describe(),
                    keys.join(", "),
                    index.name
                )
                .unwrap();
                Self::format_node(left, indent + 1, out);
                Self::format_node(right, indent + 1, out);
            }

            LogicalPlan::TableAlias { name, input } => {
                writeln!(out, "{}TableAlias({})", prefix, name).unwrap();
                Self::format_node(input, indent + 1, out);
            }

            LogicalPlan::SubqueryAlias { name, input } => {
                writeln!(out, "{}SubqueryAlias({})", prefix, name).unwrap();
                Self::format_node(input, indent + 1, out);
            }

            LogicalPlan::DescribeQuery { format, input } => {
                writeln!(out, "{}Describe({:?})", prefix, format).unwrap();
                Self::format_node(input, indent + 1, out);
            }

            LogicalPlan::InsertInto {
                table,
                columns,
                input,
            } => {
                writeln!(out, "{}Insert: {} [{}]", prefix, table, columns.join(", ")).unwrap();
                Self::format_node(input, indent + 1, out);
            }

            LogicalPlan::Decorator { label, input, .. } => {
                writeln!(out, "{}Decorator: {}", prefix, label).unwrap();
                Self::format_node(input, indent + 1, out);
            }
        }
    }
}
