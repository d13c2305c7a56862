//! Analyzer pipeline integration tests
//!
//! Pruning scenarios plus the cross-cutting pipeline properties:
//! resolution preservation, root schema preservation, column index
//! validity, idempotence, and outer-join soundness.

mod test_utils;

use relplan::analyzer::{Analyzer, Context};
use relplan::plan::expr::Expr;
use relplan::plan::{DescribeFormat, JoinType, LogicalPlan};

use test_utils::*;

/// A representative plan: filter and projection over a cross join of
/// two pushdown-capable tables
fn sample_plan() -> LogicalPlan {
    LogicalPlan::project(
        vec![gf(2, "mytable2", "t2")],
        LogicalPlan::filter(
            Expr::and(
                Expr::eq(gf(1, "mytable", "f"), float(3.14)),
                Expr::is_null(gf(0, "mytable2", "i2")),
            ),
            LogicalPlan::cross_join(rt(pushdown_mytable()), rt(pushdown_mytable2())),
        ),
    )
}

// ============ Pruning scenarios ============

#[test]
fn test_identity_projection_collapses() {
    let plan = LogicalPlan::project(
        vec![
            gf(0, "mytable", "i"),
            gf(1, "mytable", "f"),
            gf(2, "mytable", "t"),
        ],
        rt(mytable()),
    );
    let before = schema_sig(&plan);

    let out = analyze(plan);
    assert!(matches!(out, LogicalPlan::ResolvedTable { .. }));
    assert_eq!(schema_sig(&out), before);
}

#[test]
fn test_describe_query_is_rewritten_recursively() {
    let plan = LogicalPlan::describe_query(
        DescribeFormat::Tree,
        LogicalPlan::project(
            vec![gf(0, "mytable", "i")],
            LogicalPlan::project(vec![gf(0, "mytable", "i"), gf(1, "mytable", "f")], mytable_plan()),
        ),
    );

    let expected = LogicalPlan::describe_query(
        DescribeFormat::Tree,
        LogicalPlan::project(vec![gf(0, "mytable", "i")], mytable_plan()),
    );

    assert_plan_eq(&run_rule("prune_columns", plan), &expected);
}

fn mytable_plan() -> LogicalPlan {
    rt(mytable())
}

#[test]
fn test_insert_into_select_is_not_pruned() {
    let plan = LogicalPlan::insert_into(
        "other",
        vec!["a".to_string(), "b".to_string()],
        LogicalPlan::project(vec![gf(1, "mytable", "f"), gf(2, "mytable", "t")], rt(mytable())),
    );
    let before = plan.explain();
    assert_eq!(analyze(plan).explain(), before);
}

#[test]
fn test_subquery_alias_pruned_with_translated_columns() {
    let plan = LogicalPlan::project(
        vec![gf(0, "sq", "i")],
        LogicalPlan::subquery_alias(
            "sq",
            LogicalPlan::project(
                vec![gf(0, "mytable", "i"), gf(1, "mytable", "f")],
                rt(mytable()),
            ),
        ),
    );
    let before = schema_sig(&plan);

    let out = analyze(plan);
    assert_eq!(schema_sig(&out), before);
    assert_indexes_valid(&out);

    // f is not visible outside the alias and is pruned inside it
    let mut inner_exprs = None;
    out.inspect(&mut |n| {
        if let LogicalPlan::SubqueryAlias { input, .. } = n {
            if let LogicalPlan::Project { expressions, .. } = input.as_ref() {
                inner_exprs = Some(expressions.len());
            }
            return false;
        }
        true
    });
    assert_eq!(inner_exprs, Some(1));
}

// ============ Pipeline properties ============

#[test]
fn test_pipeline_preserves_resolution_and_root_schema() {
    let plan = sample_plan();
    assert!(plan.resolved());
    let before = schema_sig(&plan);

    let out = analyze(plan);
    assert!(out.resolved());
    assert_eq!(schema_sig(&out), before);
}

#[test]
fn test_pipeline_output_has_valid_indexes_after_each_rule() {
    let analyzer = Analyzer::new();
    let ctx = Context::new();
    let mut plan = sample_plan();
    for rule in analyzer.rules() {
        plan = (rule.apply)(&ctx, &analyzer, plan, &relplan::Scope::root()).unwrap();
        assert_indexes_valid(&plan);
    }
}

#[test]
fn test_pipeline_is_idempotent() {
    let once = analyze(sample_plan());
    let twice = analyze(once.clone());
    assert_eq!(twice.explain(), once.explain());
}

#[test]
fn test_pipeline_is_idempotent_with_indexes() {
    let plan = LogicalPlan::project(
        vec![gf(0, "mytable", "i")],
        LogicalPlan::filter(
            Expr::and(
                Expr::eq(gf(1, "mytable", "f"), float(3.14)),
                Expr::eq(gf(3, "mytable2", "i2"), int(21)),
            ),
            LogicalPlan::cross_join(rt(indexed_mytable()), rt(indexed_mytable2())),
        ),
    );
    let once = analyze(plan);
    assert_indexes_valid(&once);
    let twice = analyze(once.clone());
    assert_eq!(twice.explain(), once.explain());
}

#[test]
fn test_outer_join_soundness() {
    let cond = Expr::eq(gf(0, "mytable", "i"), gf(3, "mytable2", "i2"));
    let plan = LogicalPlan::project(
        vec![gf(2, "mytable2", "t2")],
        LogicalPlan::filter(
            Expr::and(
                Expr::eq(gf(1, "mytable", "f"), float(3.14)),
                Expr::is_null(gf(0, "mytable2", "i2")),
            ),
            LogicalPlan::left_join(rt(mytable()), rt(mytable2()), cond),
        ),
    );

    let out = analyze(plan);
    assert_indexes_valid(&out);

    // No predicate over right-side columns may appear below the left
    // join
    let mut right_side_filters = 0;
    out.inspect(&mut |n| {
        if let LogicalPlan::Join {
            join_type: JoinType::Left,
            right,
            ..
        } = n
        {
            right.inspect(&mut |m| {
                if matches!(m, LogicalPlan::Filter { .. }) {
                    right_side_filters += 1;
                }
                true
            });
        }
        true
    });
    assert_eq!(right_side_filters, 0);
}

#[test]
fn test_unresolved_plan_passes_through_unchanged() {
    let plan = LogicalPlan::project(
        vec![gf(0, "missing", "x")],
        LogicalPlan::filter(
            Expr::is_null(gf(0, "missing", "x")),
            LogicalPlan::unresolved_table("missing"),
        ),
    );
    let before = plan.explain();
    assert_eq!(analyze(plan).explain(), before);
}

#[test]
fn test_single_rule_selection() {
    let analyzer = Analyzer::new();
    assert!(analyzer.rule("prune_columns").is_some());
    assert!(analyzer.rule("pushdown_projections").is_some());
    assert!(analyzer.rule("pushdown_filters").is_some());
    assert!(analyzer.rule("join_reordering").is_none());
}

#[test]
fn test_cancelled_context_returns_plan_so_far() {
    let ctx = Context::new();
    ctx.cancel();
    let plan = sample_plan();
    let before = plan.explain();
    let out = Analyzer::new().analyze(&ctx, plan).unwrap();
    assert_eq!(out.explain(), before);
}
