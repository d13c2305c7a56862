//! Projection and aggregation pruning
//!
//! Removes expressions from Project and GroupBy nodes that are
//! neither observable at the root nor referenced above them, then
//! recomputes every column index. Subquery aliases are pruned
//! recursively with a usage set translated through the alias schema.

use std::collections::{HashMap, HashSet};

use crate::analyzer::{fix_field_indexes, Analyzer, Context, Scope};
use crate::error::{PlanError, PlanResult};
use crate::plan::expr::Expr;
use crate::plan::LogicalPlan;

/// The set of `(table, column)` pairs a subtree must preserve
#[derive(Debug, Default)]
struct UsedColumns {
    columns: HashMap<String, HashSet<String>>,
}

impl UsedColumns {
    fn add(&mut self, table: &str, column: &str) {
        self.columns
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string());
    }

    fn has(&self, table: &str, column: &str) -> bool {
        self.columns
            .get(table)
            .is_some_and(|cols| cols.contains(column))
    }

    fn get(&self, table: &str) -> Option<&HashSet<String>> {
        self.columns.get(table)
    }
}

/// Remove unneeded columns from Project and GroupBy nodes
pub fn prune_columns(
    ctx: &Context,
    a: &Analyzer,
    node: LogicalPlan,
    scope: &Scope,
) -> PlanResult<LogicalPlan> {
    if !node.resolved() {
        return Ok(node);
    }

    // For INSERT ... SELECT every column of the select is used by the
    // insert, and pruning below could alter the select's column order.
    if matches!(node, LogicalPlan::InsertInto { .. }) {
        return Ok(node);
    }

    let node = match node {
        LogicalPlan::DescribeQuery { format, input } => {
            let pruned = prune_columns(ctx, a, *input, scope)?;
            return Ok(LogicalPlan::describe_query(format, pruned));
        }
        other => other,
    };

    let mut columns = columns_used_by_output(&node);
    find_used_columns(&mut columns, &node);

    let node = prune_unused_columns(node, &columns)?;
    let node = prune_subqueries(ctx, a, node, &columns, scope)?;

    fix_field_indexes(node)
}

/// Seed the usage set with the root schema: those columns are
/// observable by the caller
fn columns_used_by_output(node: &LogicalPlan) -> UsedColumns {
    let mut columns = UsedColumns::default();
    for col in node.schema().iter() {
        columns.add(&col.source, &col.name);
    }
    columns
}

fn find_used_columns(columns: &mut UsedColumns, node: &LogicalPlan) {
    node.inspect(&mut |n| match n {
        LogicalPlan::Project { expressions, .. } => {
            add_used_project_columns(columns, expressions);
            true
        }
        LogicalPlan::GroupBy {
            selected, grouping, ..
        } => {
            add_used_project_columns(columns, selected);
            add_used_columns(columns, grouping);
            true
        }
        // Isolation boundary: the subquery is pruned separately with a
        // translated usage set
        LogicalPlan::SubqueryAlias { .. } => false,
        other => {
            if other.is_expression_carrying() {
                for expr in other.expressions() {
                    expr.for_each_column(&mut |col| columns.add(&col.table, &col.name));
                }
            }
            true
        }
    });
}

/// Bare column references in a projection are pass-throughs: they only
/// matter if something above consumes them, in which case they are
/// already in the usage set. Only computed expressions contribute.
fn add_used_project_columns(columns: &mut UsedColumns, projection: &[Expr]) {
    for expr in projection {
        if !matches!(expr, Expr::Column(_)) {
            expr.for_each_column(&mut |col| columns.add(&col.table, &col.name));
        }
    }
}

fn add_used_columns(columns: &mut UsedColumns, exprs: &[Expr]) {
    for expr in exprs {
        expr.for_each_column(&mut |col| columns.add(&col.table, &col.name));
    }
}

fn prune_unused_columns(node: LogicalPlan, columns: &UsedColumns) -> PlanResult<LogicalPlan> {
    match node {
        // Subquery interiors are pruned separately, with a usage set
        // translated through the alias schema
        LogicalPlan::SubqueryAlias { .. } => Ok(node),
        LogicalPlan::Project { expressions, input } => {
            let input = prune_unused_columns(*input, columns)?;
            Ok(prune_project(expressions, Box::new(input), columns))
        }
        LogicalPlan::GroupBy {
            selected,
            grouping,
            input,
        } => {
            let input = prune_unused_columns(*input, columns)?;
            Ok(prune_group_by(selected, grouping, Box::new(input), columns))
        }
        other => {
            let children: Vec<LogicalPlan> = other.children().into_iter().cloned().collect();
            let children = children
                .into_iter()
                .map(|c| prune_unused_columns(c, columns))
                .collect::<PlanResult<Vec<_>>>()?;
            other.with_children(children)
        }
    }
}

fn prune_project(
    expressions: Vec<Expr>,
    input: Box<LogicalPlan>,
    columns: &UsedColumns,
) -> LogicalPlan {
    let remaining: Vec<Expr> = expressions
        .into_iter()
        .filter(|e| !should_prune(e, columns))
        .collect();

    if remaining.is_empty() {
        return *input;
    }

    // A projection that reproduces its child schema exactly is
    // entirely pass-through and redundant
    if is_identity_projection(&remaining, &input) {
        return *input;
    }

    LogicalPlan::Project {
        expressions: remaining,
        input,
    }
}

fn prune_group_by(
    selected: Vec<Expr>,
    grouping: Vec<Expr>,
    input: Box<LogicalPlan>,
    columns: &UsedColumns,
) -> LogicalPlan {
    let remaining: Vec<Expr> = selected
        .into_iter()
        .filter(|e| !should_prune(e, columns))
        .collect();

    if remaining.is_empty() {
        return *input;
    }

    LogicalPlan::GroupBy {
        selected: remaining,
        grouping,
        input,
    }
}

fn should_prune(expr: &Expr, columns: &UsedColumns) -> bool {
    match expr {
        Expr::Column(col) if !col.table.is_empty() => !columns.has(&col.table, &col.name),
        _ => false,
    }
}

fn is_identity_projection(exprs: &[Expr], input: &LogicalPlan) -> bool {
    let schema = input.schema();
    if exprs.len() != schema.len() {
        return false;
    }
    exprs.iter().zip(schema.iter()).all(|(e, col)| match e {
        Expr::Column(c) => c.table == col.source && c.name == col.name,
        _ => false,
    })
}

/// Prune inside each subquery alias with a usage set translated
/// through the alias schema
fn prune_subqueries(
    ctx: &Context,
    a: &Analyzer,
    node: LogicalPlan,
    parent_columns: &UsedColumns,
    scope: &Scope,
) -> PlanResult<LogicalPlan> {
    match node {
        LogicalPlan::SubqueryAlias { name, input } => {
            prune_subquery_columns(ctx, a, name, *input, parent_columns, scope)
        }
        other => {
            let children: Vec<LogicalPlan> = other.children().into_iter().cloned().collect();
            let children = children
                .into_iter()
                .map(|c| prune_subqueries(ctx, a, c, parent_columns, scope))
                .collect::<PlanResult<Vec<_>>>()?;
            other.with_children(children)
        }
    }
}

fn prune_subquery_columns(
    ctx: &Context,
    a: &Analyzer,
    name: String,
    child: LogicalPlan,
    parent_columns: &UsedColumns,
    scope: &Scope,
) -> PlanResult<LogicalPlan> {
    a.log(format_args!(
        "pruning columns of subquery with alias {:?}",
        name
    ));

    // The columns coming from the parent have the alias as their
    // source; find the real table of each in the child schema.
    let child_schema = child.schema();
    let mut columns = UsedColumns::default();
    if let Some(projected) = parent_columns.get(&name) {
        for col in projected {
            match child_schema.source_of(col) {
                Some(table) => {
                    let table = table.to_string();
                    columns.add(&table, col);
                }
                None => {
                    return Err(PlanError::MissingProjectedColumn {
                        column: col.clone(),
                        subquery: name,
                    })
                }
            }
        }
    }

    find_used_columns(&mut columns, &child);

    let node = prune_unused_columns(child, &columns)?;
    let node = prune_subqueries(ctx, a, node, &columns, &scope.descend())?;

    // Field indexes are not fixed here; the outer pass recomputes the
    // whole tree, subquery interiors included.
    Ok(LogicalPlan::subquery_alias(name, node))
}
