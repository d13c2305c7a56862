//! Index recomputation
//!
//! Column references carry a positional `index` into the enclosing
//! operator's child schema. Every structural rewrite invalidates those
//! positions; this pass rebinds them. It runs bottom-up over every
//! expression-carrying node: the node's children's schemas are
//! concatenated in order and each `(table, name)` reference is
//! replaced with its offset in that table.
//!
//! Subquery aliases need no special casing: recomputation is local to
//! each node, so nodes inside an alias bind against the alias's own
//! internal schemas.

use std::collections::HashMap;

use crate::catalog::Schema;
use crate::error::{PlanError, PlanResult};
use crate::plan::LogicalPlan;

/// Rebind every column reference in the plan to its offset in the
/// concatenated child schema of its node
pub fn fix_field_indexes(plan: LogicalPlan) -> PlanResult<LogicalPlan> {
    plan.transform_up(&mut |node| {
        if !node.is_expression_carrying() {
            return Ok(node);
        }

        let indexes: HashMap<(String, String), usize> = {
            let mut schema = Schema::new();
            for child in node.children() {
                schema.extend(child.schema());
            }
            if schema.is_empty() {
                return Ok(node);
            }
            schema
                .iter()
                .enumerate()
                .map(|(i, col)| ((col.source.clone(), col.name.clone()), i))
                .collect()
        };

        node.map_expressions(&mut |e| {
            e.map_columns(&mut |col| {
                match indexes.get(&(col.table.clone(), col.name.clone())) {
                    Some(&index) => Ok(col.with_index(index)),
                    None => Err(PlanError::ColumnTableNotFound {
                        table: col.table.clone(),
                        column: col.name.clone(),
                    }),
                }
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType};
    use crate::plan::expr::{ColumnRef, Expr, Literal};
    use crate::source::MemorySource;

    fn table(name: &str, cols: &[(&str, DataType)]) -> LogicalPlan {
        let schema: Schema = cols
            .iter()
            .map(|(n, t)| Column::new(*n, name, t.clone()))
            .collect();
        LogicalPlan::resolved_table(MemorySource::new(name, schema).into_ref())
    }

    fn gf(index: usize, table: &str, name: &str) -> Expr {
        Expr::Column(ColumnRef::new(index, table, name, DataType::Int, true))
    }

    #[test]
    fn test_rebinds_stale_indices() {
        // Both references deliberately stale
        let plan = LogicalPlan::filter(
            Expr::and(
                Expr::eq(gf(9, "a", "y"), Expr::Literal(Literal::Integer(1))),
                Expr::eq(gf(9, "b", "z"), Expr::Literal(Literal::Integer(2))),
            ),
            LogicalPlan::cross_join(
                table("a", &[("x", DataType::Int), ("y", DataType::Int)]),
                table("b", &[("z", DataType::Int)]),
            ),
        );

        let fixed = fix_field_indexes(plan).unwrap();
        let mut indices = Vec::new();
        match &fixed {
            LogicalPlan::Filter { predicate, .. } => {
                predicate.for_each_column(&mut |c| indices.push((c.table.clone(), c.index)));
            }
            other => panic!("Expected Filter, got {:?}", other),
        }
        assert_eq!(
            indices,
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let plan = LogicalPlan::filter(
            Expr::is_null(gf(0, "nowhere", "x")),
            table("a", &[("x", DataType::Int)]),
        );
        let err = fix_field_indexes(plan).unwrap_err();
        assert_eq!(
            err,
            PlanError::ColumnTableNotFound {
                table: "nowhere".to_string(),
                column: "x".to_string(),
            }
        );
    }

    #[test]
    fn test_alias_schema_wins_over_source_name() {
        let plan = LogicalPlan::filter(
            Expr::is_null(gf(5, "t1", "x")),
            LogicalPlan::table_alias("t1", table("a", &[("w", DataType::Int), ("x", DataType::Int)])),
        );
        let fixed = fix_field_indexes(plan).unwrap();
        match &fixed {
            LogicalPlan::Filter { predicate, .. } => {
                let mut idx = None;
                predicate.for_each_column(&mut |c| idx = Some(c.index));
                assert_eq!(idx, Some(1));
            }
            other => panic!("Expected Filter, got {:?}", other),
        }
    }

    #[test]
    fn test_subquery_interior_binds_to_its_own_universe() {
        // Outer filter sees the alias schema; the inner project sees
        // the underlying table schema.
        let inner = LogicalPlan::project(
            vec![gf(7, "a", "x")],
            table("a", &[("w", DataType::Int), ("x", DataType::Int)]),
        );
        let plan = LogicalPlan::filter(
            Expr::is_null(gf(7, "sq", "x")),
            LogicalPlan::subquery_alias("sq", inner),
        );

        let fixed = fix_field_indexes(plan).unwrap();
        match &fixed {
            LogicalPlan::Filter { predicate, input } => {
                let mut outer = None;
                predicate.for_each_column(&mut |c| outer = Some(c.index));
                assert_eq!(outer, Some(0));

                match input.as_ref() {
                    LogicalPlan::SubqueryAlias { input, .. } => match input.as_ref() {
                        LogicalPlan::Project { expressions, .. } => {
                            let mut inner_idx = None;
                            expressions[0].for_each_column(&mut |c| inner_idx = Some(c.index));
                            assert_eq!(inner_idx, Some(1));
                        }
                        other => panic!("Expected Project, got {:?}", other),
                    },
                    other => panic!("Expected SubqueryAlias, got {:?}", other),
                }
            }
            other => panic!("Expected Filter, got {:?}", other),
        }
    }
}
