//! Filter and projection pushdown
//!
//! Two rules cooperate to move work toward the leaves:
//!
//! - `pushdown_projections` computes, for every resolved table whose
//!   source can absorb a projection, the set of columns actually
//!   referenced above it, and pushes that reduced column set into the
//!   source.
//! - `pushdown_filters` splits each filter into conjuncts and
//!   relocates every single-table conjunct to the deepest legal
//!   position: below cross and inner joins, below the preserved side
//!   of outer joins, absorbed into the source where it advertises the
//!   filter capability, and never below the nullable side of an outer
//!   join. Equality conjuncts over an indexed column additionally
//!   select an index lookup for the source.
//!
//! Both rules finish with a full index recomputation. Subquery alias
//! interiors are rewritten as independent column universes: conjuncts
//! never cross the boundary in either direction, and projection usage
//! inside an alias is seeded with every column the alias exports.

use std::collections::HashMap;

use crate::analyzer::{fix_field_indexes, Analyzer, Context, Scope};
use crate::catalog::Schema;
use crate::error::{PlanError, PlanResult};
use crate::plan::expr::{BinaryOp, Expr, Literal};
use crate::plan::{DecorationKind, JoinType, LogicalPlan};
use crate::source::{
    FilteredSource, IndexHandle, IndexedSource, ProjectedSource, Source, SourceRef,
};

/// Push reduced column sets into projection-capable sources
pub fn pushdown_projections(
    _ctx: &Context,
    _a: &Analyzer,
    node: LogicalPlan,
    _scope: &Scope,
) -> PlanResult<LogicalPlan> {
    if !node.resolved() {
        return Ok(node);
    }

    let fields = fields_by_table(&node);
    let node = push_projections(node, &fields)?;
    fix_field_indexes(node)
}

/// Relocate filter conjuncts toward the leaves, absorb them into
/// filter-capable sources, and select index lookups
pub fn pushdown_filters(
    _ctx: &Context,
    _a: &Analyzer,
    node: LogicalPlan,
    _scope: &Scope,
) -> PlanResult<LogicalPlan> {
    if !node.resolved() {
        return Ok(node);
    }

    let (node, leftover) = push_into(node, Vec::new(), true)?;
    let node = wrap_filter(node, leftover);
    fix_field_indexes(node)
}

// ============ Projection pushdown ============

/// Column names referenced per table across the whole plan, in
/// first-seen order. Filters already absorbed by a source count as
/// references: projecting their columns away would leave the source
/// unable to evaluate them.
fn fields_by_table(node: &LogicalPlan) -> HashMap<String, Vec<String>> {
    let mut fields: HashMap<String, Vec<String>> = HashMap::new();
    node.inspect(&mut |n| {
        // Stop at subquery boundaries: interiors are scanned with
        // their own usage map when push_projections reaches the alias
        if matches!(n, LogicalPlan::SubqueryAlias { .. }) {
            return false;
        }
        let mut add = |col: &crate::plan::expr::ColumnRef| {
            let names = fields.entry(col.table.clone()).or_default();
            if !names.contains(&col.name) {
                names.push(col.name.clone());
            }
        };
        for expr in n.expressions() {
            expr.for_each_column(&mut add);
        }
        if let LogicalPlan::ResolvedTable { source } = n {
            for filter in source.filters() {
                filter.for_each_column(&mut add);
            }
        }
        true
    });
    fields
}

/// The usage map for a subquery interior: every column the alias
/// exports, followed by the columns referenced inside it
fn subquery_fields(child: &LogicalPlan) -> HashMap<String, Vec<String>> {
    let mut fields: HashMap<String, Vec<String>> = HashMap::new();
    for col in child.schema().iter() {
        let names = fields.entry(col.source.clone()).or_default();
        if !names.contains(&col.name) {
            names.push(col.name.clone());
        }
    }
    for (table, names) in fields_by_table(child) {
        let entry = fields.entry(table).or_default();
        for name in names {
            if !entry.contains(&name) {
                entry.push(name);
            }
        }
    }
    fields
}

fn push_projections(
    node: LogicalPlan,
    fields: &HashMap<String, Vec<String>>,
) -> PlanResult<LogicalPlan> {
    match node {
        // A subquery interior is its own column universe: scan it
        // with a fresh usage map seeded with every column the alias
        // exports, since external usage is not translated through
        // the boundary
        LogicalPlan::SubqueryAlias { name, input } => {
            let inner_fields = subquery_fields(&input);
            let input = push_projections(*input, &inner_fields)?;
            Ok(LogicalPlan::SubqueryAlias {
                name,
                input: Box::new(input),
            })
        }
        LogicalPlan::TableAlias { name, input } => {
            let input = project_into_leaf(*input, fields.get(&name))?;
            Ok(LogicalPlan::TableAlias {
                name,
                input: Box::new(input),
            })
        }
        LogicalPlan::ResolvedTable { source } => {
            let used = fields.get(source.name());
            project_into_leaf(LogicalPlan::ResolvedTable { source }, used)
        }
        other => {
            let children: Vec<LogicalPlan> = other.children().into_iter().cloned().collect();
            let children = children
                .into_iter()
                .map(|c| push_projections(c, fields))
                .collect::<PlanResult<Vec<_>>>()?;
            other.with_children(children)
        }
    }
}

fn project_into_leaf(node: LogicalPlan, used: Option<&Vec<String>>) -> PlanResult<LogicalPlan> {
    let Some(used) = used.filter(|u| !u.is_empty()) else {
        return Ok(node);
    };
    match node {
        LogicalPlan::Decorator { kind, label, input } => Ok(LogicalPlan::Decorator {
            kind,
            label,
            input: Box::new(project_into_leaf(*input, Some(used))?),
        }),
        LogicalPlan::ResolvedTable { source } => {
            // Nothing to shrink; pushing anyway would stack a new
            // decorator on every pass
            if used.len() >= source.schema().len() {
                return Ok(LogicalPlan::ResolvedTable { source });
            }
            let new_source = match source.as_projected() {
                Some(projected) => projected.with_projection(used)?,
                None => return Ok(LogicalPlan::ResolvedTable { source }),
            };
            let label = format!("Projected table access on [{}]", used.join(" "));
            Ok(LogicalPlan::decorator(
                DecorationKind::ProjectedAccess,
                label,
                LogicalPlan::resolved_table(new_source),
            ))
        }
        other => Ok(other),
    }
}

// ============ Filter pushdown ============

/// Push `pending` conjuncts as deep as legally possible into `node`.
///
/// Returns the rebuilt node together with the conjuncts that could
/// not be placed at or below it; the caller reattaches those above.
fn push_into(
    node: LogicalPlan,
    pending: Vec<Expr>,
    allow_index: bool,
) -> PlanResult<(LogicalPlan, Vec<Expr>)> {
    match node {
        LogicalPlan::Filter { predicate, input } => {
            let own = predicate.split_conjuncts();
            // TODO: when a join-spanning conjunct is mixed with
            // single-table ones, push the single-table conjuncts and
            // keep only the join-spanning ones here
            if own.iter().any(|c| c.referenced_tables().len() > 1) {
                let (input, rest) = push_into(*input, Vec::new(), allow_index)?;
                let input = wrap_filter(input, rest);
                return Ok((
                    LogicalPlan::Filter {
                        predicate,
                        input: Box::new(input),
                    },
                    pending,
                ));
            }

            let merged: Vec<Expr> = pending.into_iter().chain(own).collect();
            let (pushable, local): (Vec<Expr>, Vec<Expr>) = merged
                .iter()
                .cloned()
                .partition(|c| c.referenced_tables().len() == 1);

            let (child, leftover) = push_into(*input, pushable, allow_index)?;
            let residual = ordered_residual(merged, leftover, local);
            Ok((wrap_filter(child, residual), Vec::new()))
        }

        LogicalPlan::Join {
            join_type,
            condition,
            left,
            right,
        } => {
            let (to_left, to_right, mut stuck) = partition_by_side(pending, &left, &right);
            // A conjunct on the nullable side of an outer join must
            // stay above it: rows synthesized as NULL on that side
            // would otherwise be filtered out.
            let (to_left, to_right) = match join_type {
                JoinType::Left => {
                    stuck.extend(to_right);
                    (to_left, Vec::new())
                }
                JoinType::Right => {
                    stuck.extend(to_left);
                    (Vec::new(), to_right)
                }
                _ => (to_left, to_right),
            };

            let (l, l_rest) = push_into(*left, to_left, allow_index)?;
            let left = wrap_filter(l, l_rest);
            let (r, r_rest) = push_into(*right, to_right, allow_index)?;
            let right = wrap_filter(r, r_rest);
            Ok((
                LogicalPlan::Join {
                    join_type,
                    condition,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                stuck,
            ))
        }

        LogicalPlan::IndexedJoin {
            join_type,
            condition,
            key_exprs,
            index,
            left,
            right,
        } => {
            let (to_left, to_right, mut stuck) = partition_by_side(pending, &left, &right);
            // Children of a Left/Right indexed join are arranged so
            // the left child is the preserved side; only it can take
            // filters.
            let (to_left, to_right) = match join_type {
                JoinType::Left | JoinType::Right => {
                    stuck.extend(to_right);
                    (to_left, Vec::new())
                }
                _ => (to_left, to_right),
            };

            let (l, l_rest) = push_into(*left, to_left, allow_index)?;
            let left = wrap_filter(l, l_rest);
            // The right side is driven by the join's preselected
            // index; never attach another lookup to it.
            let (r, r_rest) = push_into(*right, to_right, false)?;
            let right = wrap_filter(r, r_rest);
            Ok((
                LogicalPlan::IndexedJoin {
                    join_type,
                    condition,
                    key_exprs,
                    index,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                stuck,
            ))
        }

        // A subquery interior is its own column universe: pending
        // conjuncts stay above the boundary, but filters inside it
        // still relocate.
        LogicalPlan::SubqueryAlias { name, input } => {
            let (input, rest) = push_into(*input, Vec::new(), allow_index)?;
            let input = wrap_filter(input, rest);
            Ok((
                LogicalPlan::SubqueryAlias {
                    name,
                    input: Box::new(input),
                },
                pending,
            ))
        }

        other => {
            if is_table_unit(&other) {
                return attach_to_table(other, pending, allow_index);
            }
            // A schema-changing operator: conjuncts cannot relocate
            // below it; continue the scan in its subtree.
            let children: Vec<LogicalPlan> = other.children().into_iter().cloned().collect();
            let children = children
                .into_iter()
                .map(|c| {
                    let (c, rest) = push_into(c, Vec::new(), allow_index)?;
                    Ok(wrap_filter(c, rest))
                })
                .collect::<PlanResult<Vec<_>>>()?;
            Ok((other.with_children(children)?, pending))
        }
    }
}

/// Partition conjuncts by which join side contains all their
/// references; anything else (or reference-free conjuncts) is stuck
fn partition_by_side(
    pending: Vec<Expr>,
    left: &LogicalPlan,
    right: &LogicalPlan,
) -> (Vec<Expr>, Vec<Expr>, Vec<Expr>) {
    let left_schema = left.schema();
    let right_schema = right.schema();
    let left_sources = left_schema.sources();
    let right_sources = right_schema.sources();

    enum Side {
        Left,
        Right,
        Stuck,
    }

    let mut to_left = Vec::new();
    let mut to_right = Vec::new();
    let mut stuck = Vec::new();
    for conjunct in pending {
        let side = {
            let tables = conjunct.referenced_tables();
            if tables.is_empty() {
                Side::Stuck
            } else if tables.iter().all(|t| left_sources.contains(t)) {
                Side::Left
            } else if tables.iter().all(|t| right_sources.contains(t)) {
                Side::Right
            } else {
                Side::Stuck
            }
        };
        match side {
            Side::Left => to_left.push(conjunct),
            Side::Right => to_right.push(conjunct),
            Side::Stuck => stuck.push(conjunct),
        }
    }
    (to_left, to_right, stuck)
}

/// Rebuild a residual filter from `all` keeping original conjunct
/// order; `leftover` and `local` are multisets of survivors
fn ordered_residual(all: Vec<Expr>, mut leftover: Vec<Expr>, mut local: Vec<Expr>) -> Vec<Expr> {
    let mut residual = Vec::new();
    for conjunct in all {
        if let Some(pos) = leftover.iter().position(|x| x == &conjunct) {
            leftover.remove(pos);
            residual.push(conjunct);
        } else if let Some(pos) = local.iter().position(|x| x == &conjunct) {
            local.remove(pos);
            residual.push(conjunct);
        }
    }
    residual
}

fn wrap_filter(node: LogicalPlan, conjuncts: Vec<Expr>) -> LogicalPlan {
    match Expr::join_conjuncts(conjuncts) {
        Some(predicate) => LogicalPlan::filter(predicate, node),
        None => node,
    }
}

/// A resolved table, possibly wrapped in an alias and decorators
fn is_table_unit(node: &LogicalPlan) -> bool {
    match node {
        LogicalPlan::ResolvedTable { .. } => true,
        LogicalPlan::TableAlias { input, .. } | LogicalPlan::Decorator { input, .. } => {
            is_table_unit(input)
        }
        _ => false,
    }
}

fn table_source(node: &LogicalPlan) -> Option<&SourceRef> {
    match node {
        LogicalPlan::ResolvedTable { source } => Some(source),
        LogicalPlan::TableAlias { input, .. } | LogicalPlan::Decorator { input, .. } => {
            table_source(input)
        }
        _ => None,
    }
}

/// The name the rest of the plan sees for this table unit: the alias
/// where one is present, the source name otherwise
fn visible_name(node: &LogicalPlan) -> Option<&str> {
    match node {
        LogicalPlan::TableAlias { name, .. } => Some(name),
        LogicalPlan::ResolvedTable { source } => Some(source.name()),
        LogicalPlan::Decorator { input, .. } => visible_name(input),
        _ => None,
    }
}

/// Replace the innermost resolved table of a table unit, keeping any
/// alias and decorator wrappers in place
fn replace_table(node: LogicalPlan, replacement: LogicalPlan) -> LogicalPlan {
    match node {
        LogicalPlan::ResolvedTable { .. } => replacement,
        LogicalPlan::TableAlias { name, input } => LogicalPlan::TableAlias {
            name,
            input: Box::new(replace_table(*input, replacement)),
        },
        LogicalPlan::Decorator { kind, label, input } => LogicalPlan::Decorator {
            kind,
            label,
            input: Box::new(replace_table(*input, replacement)),
        },
        other => other,
    }
}

/// Land pending conjuncts on a table unit: absorb what the source
/// accepts, select an index lookup, and leave the rest as a filter
/// directly above
fn attach_to_table(
    node: LogicalPlan,
    pending: Vec<Expr>,
    allow_index: bool,
) -> PlanResult<(LogicalPlan, Vec<Expr>)> {
    if pending.is_empty() {
        return Ok((node, Vec::new()));
    }
    let Some(source) = table_source(&node).cloned() else {
        return Ok((wrap_filter(node, pending), Vec::new()));
    };

    let mut node = node;
    let mut remaining = pending;

    // Filtered access: conjuncts the source declares handled become
    // part of its state, rebased to its visible schema
    if let Some(filtered) = source.as_filtered() {
        let handled = filtered.handled_filters(&remaining);
        if !handled.is_empty() {
            let mut to_remove = handled.clone();
            remaining.retain(|c| {
                if let Some(pos) = to_remove.iter().position(|x| x == c) {
                    to_remove.remove(pos);
                    false
                } else {
                    true
                }
            });

            let predicates: Vec<String> = handled.iter().map(|e| e.to_string()).collect();
            let schema = source.schema().clone();
            let rebased = handled
                .into_iter()
                .map(|e| rebase_to_table(e, &schema))
                .collect::<PlanResult<Vec<_>>>()?;
            let new_source = filtered.with_filters(rebased)?;

            let label = format!("Filtered table access on [{}]", predicates.join(", "));
            node = replace_table(
                node,
                LogicalPlan::decorator(
                    DecorationKind::FilteredAccess,
                    label,
                    LogicalPlan::resolved_table(new_source),
                ),
            );
        }
    }

    if allow_index && !remaining.is_empty() {
        node = select_index(node, &remaining)?;
    }

    Ok((wrap_filter(node, remaining), Vec::new()))
}

/// Rebind an absorbed conjunct's references to offsets in the table's
/// own visible schema
fn rebase_to_table(expr: Expr, schema: &Schema) -> PlanResult<Expr> {
    expr.map_columns(&mut |col| {
        match schema.iter().position(|c| c.name == col.name) {
            Some(index) => Ok(col.with_index(index)),
            None => Err(PlanError::ColumnTableNotFound {
                table: col.table.clone(),
                column: col.name.clone(),
            }),
        }
    })
}

/// Match an equality conjunct over an index's leading column to an
/// index lookup on the source
fn select_index(node: LogicalPlan, conjuncts: &[Expr]) -> PlanResult<LogicalPlan> {
    let Some(source) = table_source(&node).cloned() else {
        return Ok(node);
    };
    // A table already driven by a lookup is left alone
    if source.index_lookup().is_some() {
        return Ok(node);
    }
    let Some(visible) = visible_name(&node).map(str::to_string) else {
        return Ok(node);
    };
    let Some(indexed) = source.as_indexed() else {
        return Ok(node);
    };

    let equalities: Vec<(&str, &Literal)> = conjuncts
        .iter()
        .filter_map(|c| equality_on(c, &visible))
        .collect();
    if equalities.is_empty() {
        return Ok(node);
    }

    let indexes = indexed.indexes();
    let matching: Vec<&IndexHandle> = indexes
        .iter()
        .filter(|ix| {
            equalities
                .iter()
                .any(|(column, _)| *column == ix.leading_column())
        })
        .collect();
    // Primary-key index preferred, then declaration order
    let Some(handle) = matching
        .iter()
        .find(|ix| ix.primary)
        .copied()
        .or_else(|| matching.first().copied())
    else {
        return Ok(node);
    };
    let Some((_, value)) = equalities
        .iter()
        .find(|(column, _)| *column == handle.leading_column())
    else {
        return Ok(node);
    };

    let lookup = handle.get(&[(*value).clone()])?;
    let new_source = indexed.with_index_lookup(lookup)?;
    let label = format!("Indexed table access on index [{}]", handle.name);
    Ok(replace_table(
        node,
        LogicalPlan::decorator(
            DecorationKind::IndexedAccess,
            label,
            LogicalPlan::resolved_table(new_source),
        ),
    ))
}

fn equality_on<'a>(conjunct: &'a Expr, table: &str) -> Option<(&'a str, &'a Literal)> {
    let Expr::Binary {
        left,
        op: BinaryOp::Eq,
        right,
        ..
    } = conjunct
    else {
        return None;
    };
    match (left.as_ref(), right.as_ref()) {
        (Expr::Column(col), Expr::Literal(lit)) | (Expr::Literal(lit), Expr::Column(col))
            if col.table == table =>
        {
            Some((&col.name, lit))
        }
        _ => None,
    }
}
