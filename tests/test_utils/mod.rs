//! Shared test utilities for analyzer integration tests
#![allow(dead_code)]

use relplan::analyzer::{Analyzer, Context, Scope};
use relplan::catalog::{Column, DataType, Schema};
use relplan::plan::expr::{ColumnRef, Expr, Literal};
use relplan::plan::LogicalPlan;
use relplan::source::{
    FilteredSource, IndexHandle, IndexedSource, MemorySource, ProjectedSource, Source, SourceRef,
};

/// `mytable(i int, f float, t text)` without declared indexes
pub fn mytable() -> MemorySource {
    MemorySource::new(
        "mytable",
        Schema::from(vec![
            Column::new("i", "mytable", DataType::Int)
                .nullable(false)
                .primary_key(),
            Column::new("f", "mytable", DataType::Double),
            Column::new("t", "mytable", DataType::Text),
        ]),
    )
}

/// `mytable2(i2 int, f2 float, t2 text)` without declared indexes
pub fn mytable2() -> MemorySource {
    MemorySource::new(
        "mytable2",
        Schema::from(vec![
            Column::new("i2", "mytable2", DataType::Int)
                .nullable(false)
                .primary_key(),
            Column::new("f2", "mytable2", DataType::Double),
            Column::new("t2", "mytable2", DataType::Text),
        ]),
    )
}

/// `mytable` with projection and filter absorption advertised
pub fn pushdown_mytable() -> MemorySource {
    mytable().with_pushdown()
}

/// `mytable2` with projection and filter absorption advertised
pub fn pushdown_mytable2() -> MemorySource {
    mytable2().with_pushdown()
}

/// `mytable` with its primary-key index and a secondary index on `f`
pub fn indexed_mytable() -> MemorySource {
    mytable().with_primary_key_index().with_index(&["f"])
}

/// `mytable2` with its primary-key index
pub fn indexed_mytable2() -> MemorySource {
    mytable2().with_primary_key_index()
}

pub fn rt(source: MemorySource) -> LogicalPlan {
    LogicalPlan::resolved_table(source.into_ref())
}

pub fn gf(index: usize, table: &str, name: &str) -> Expr {
    Expr::Column(ColumnRef::new(index, table, name, DataType::Int, true))
}

pub fn int(value: i64) -> Expr {
    Expr::Literal(Literal::Integer(value))
}

pub fn float(value: f64) -> Expr {
    Expr::Literal(Literal::Float(value))
}

pub fn text(value: &str) -> Expr {
    Expr::Literal(Literal::String(value.to_string()))
}

/// Restrict a source to the given columns, as the optimizer would
pub fn projected(source: &dyn Source, columns: &[&str]) -> SourceRef {
    let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    source
        .as_projected()
        .expect("source advertises projection")
        .with_projection(&columns)
        .unwrap()
}

/// Absorb filters into a source, as the optimizer would
pub fn filtered(source: &dyn Source, filters: Vec<Expr>) -> SourceRef {
    source
        .as_filtered()
        .expect("source advertises filter absorption")
        .with_filters(filters)
        .unwrap()
}

/// Attach an index lookup to a source, as the optimizer would
pub fn with_lookup(source: &dyn Source, index: &IndexHandle, key: &[Literal]) -> SourceRef {
    source
        .as_indexed()
        .expect("source advertises indexes")
        .with_index_lookup(index.get(key).unwrap())
        .unwrap()
}

/// Run a single named rule over a plan
pub fn run_rule(name: &str, plan: LogicalPlan) -> LogicalPlan {
    let analyzer = Analyzer::new();
    let rule = analyzer.rule(name).expect("rule is registered");
    (rule.apply)(&Context::new(), &analyzer, plan, &Scope::root()).unwrap()
}

/// Run the full default pipeline over a plan
pub fn analyze(plan: LogicalPlan) -> LogicalPlan {
    Analyzer::new().analyze(&Context::new(), plan).unwrap()
}

/// The root schema as a comparable `(name, source, type, nullable)`
/// sequence
pub fn schema_sig(plan: &LogicalPlan) -> Vec<(String, String, String, bool)> {
    plan.schema()
        .iter()
        .map(|c| {
            (
                c.name.clone(),
                c.source.clone(),
                format!("{:?}", c.data_type),
                c.nullable,
            )
        })
        .collect()
}

/// Structural equality via explain output
pub fn assert_plan_eq(actual: &LogicalPlan, expected: &LogicalPlan) {
    let actual = actual.explain();
    let expected = expected.explain();
    assert_eq!(
        actual, expected,
        "plans differ\n--- actual ---\n{}\n--- expected ---\n{}",
        actual, expected
    );
}

/// Check the column-index validity invariant on every
/// expression-carrying node: each reference's index points at a slot
/// whose `(source, name)` matches the reference
pub fn assert_indexes_valid(plan: &LogicalPlan) {
    plan.inspect(&mut |n| {
        if n.is_expression_carrying() {
            let mut schema = Schema::new();
            for child in n.children() {
                schema.extend(child.schema());
            }
            if !schema.is_empty() {
                for expr in n.expressions() {
                    expr.for_each_column(&mut |col| {
                        let slot = schema.get(col.index).unwrap_or_else(|| {
                            panic!(
                                "reference {}.{}#{} points past the child schema",
                                col.table, col.name, col.index
                            )
                        });
                        assert_eq!(
                            (slot.source.as_str(), slot.name.as_str()),
                            (col.table.as_str(), col.name.as_str()),
                            "reference {}.{}#{} does not match its slot",
                            col.table,
                            col.name,
                            col.index
                        );
                    });
                }
            }
        }
        true
    });
}
