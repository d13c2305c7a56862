//! Logical plan representation
//!
//! A logical plan is a tree of relational operator nodes, each
//! carrying expression trees and exposing the schema it produces.
//! Plans are immutable values: every rewrite builds new nodes and
//! shares unchanged subtrees by reference.

pub mod explain;
pub mod expr;

pub use explain::ExplainOutput;

use crate::catalog::{Column, DataType, Schema};
use crate::error::{PlanError, PlanResult};
use crate::plan::expr::Expr;
use crate::source::{IndexHandle, Source, SourceRef};

/// JOIN type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Cross,
    Inner,
    Left,
    Right,
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JoinType::Cross => "Cross",
            JoinType::Inner => "Inner",
            JoinType::Left => "Left",
            JoinType::Right => "Right",
        };
        write!(f, "{}", name)
    }
}

/// EXPLAIN/DESCRIBE output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeFormat {
    Tree,
}

/// Decoration kinds marking capability pushdown outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationKind {
    ProjectedAccess,
    FilteredAccess,
    IndexedAccess,
}

/// Logical plan node
#[derive(Debug, Clone)]
pub enum LogicalPlan {
    /// A table reference that has not been resolved against a source
    UnresolvedTable { name: String },

    /// A resolved table backed by a source
    ResolvedTable { source: SourceRef },

    /// Project columns (SELECT list)
    Project {
        expressions: Vec<Expr>,
        input: Box<LogicalPlan>,
    },

    /// Grouped select: selected expressions over grouping expressions
    GroupBy {
        selected: Vec<Expr>,
        grouping: Vec<Expr>,
        input: Box<LogicalPlan>,
    },

    /// Filter rows based on a predicate
    Filter {
        predicate: Expr,
        input: Box<LogicalPlan>,
    },

    /// Join two inputs; schema is left ++ right
    Join {
        join_type: JoinType,
        condition: Option<Expr>,
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },

    /// A join whose right side is driven by a precomputed index key.
    /// For Left and Right joins the children are arranged so the left
    /// child is the preserved side.
    IndexedJoin {
        join_type: JoinType,
        condition: Expr,
        key_exprs: Vec<Expr>,
        index: IndexHandle,
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },

    /// Reroutes the child schema to report the alias as the source of
    /// every column
    TableAlias {
        name: String,
        input: Box<LogicalPlan>,
    },

    /// Isolation boundary: externally columns appear with the alias as
    /// source, internally they keep their true origin
    SubqueryAlias {
        name: String,
        input: Box<LogicalPlan>,
    },

    /// Passthrough wrapper whose child is rewritten recursively
    DescribeQuery {
        format: DescribeFormat,
        input: Box<LogicalPlan>,
    },

    /// INSERT, possibly with a SELECT child. Never rewritten by the
    /// pruning pass: column order of the child is load-bearing.
    InsertInto {
        table: String,
        columns: Vec<String>,
        input: Box<LogicalPlan>,
    },

    /// Annotation wrapper making capability pushdown visible; does not
    /// change semantics or schema
    Decorator {
        kind: DecorationKind,
        label: String,
        input: Box<LogicalPlan>,
    },
}

impl LogicalPlan {
    // ============ Constructors ============

    /// A resolved table over a source
    pub fn resolved_table(source: SourceRef) -> LogicalPlan {
        LogicalPlan::ResolvedTable { source }
    }

    /// An unresolved table reference
    pub fn unresolved_table(name: impl Into<String>) -> LogicalPlan {
        LogicalPlan::UnresolvedTable { name: name.into() }
    }

    /// A projection over a child
    pub fn project(expressions: Vec<Expr>, input: LogicalPlan) -> LogicalPlan {
        LogicalPlan::Project {
            expressions,
            input: Box::new(input),
        }
    }

    /// A grouped select over a child
    pub fn group_by(selected: Vec<Expr>, grouping: Vec<Expr>, input: LogicalPlan) -> LogicalPlan {
        LogicalPlan::GroupBy {
            selected,
            grouping,
            input: Box::new(input),
        }
    }

    /// A filter over a child
    pub fn filter(predicate: Expr, input: LogicalPlan) -> LogicalPlan {
        LogicalPlan::Filter {
            predicate,
            input: Box::new(input),
        }
    }

    /// A cross join
    pub fn cross_join(left: LogicalPlan, right: LogicalPlan) -> LogicalPlan {
        LogicalPlan::Join {
            join_type: JoinType::Cross,
            condition: None,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// An inner join on a condition
    pub fn inner_join(left: LogicalPlan, right: LogicalPlan, condition: Expr) -> LogicalPlan {
        LogicalPlan::Join {
            join_type: JoinType::Inner,
            condition: Some(condition),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// A left outer join on a condition
    pub fn left_join(left: LogicalPlan, right: LogicalPlan, condition: Expr) -> LogicalPlan {
        LogicalPlan::Join {
            join_type: JoinType::Left,
            condition: Some(condition),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// A right outer join on a condition
    pub fn right_join(left: LogicalPlan, right: LogicalPlan, condition: Expr) -> LogicalPlan {
        LogicalPlan::Join {
            join_type: JoinType::Right,
            condition: Some(condition),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// An indexed join
    pub fn indexed_join(
        left: LogicalPlan,
        right: LogicalPlan,
        join_type: JoinType,
        condition: Expr,
        key_exprs: Vec<Expr>,
        index: IndexHandle,
    ) -> LogicalPlan {
        LogicalPlan::IndexedJoin {
            join_type,
            condition,
            key_exprs,
            index,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// A table alias over a child
    pub fn table_alias(name: impl Into<String>, input: LogicalPlan) -> LogicalPlan {
        LogicalPlan::TableAlias {
            name: name.into(),
            input: Box::new(input),
        }
    }

    /// A subquery alias over a child
    pub fn subquery_alias(name: impl Into<String>, input: LogicalPlan) -> LogicalPlan {
        LogicalPlan::SubqueryAlias {
            name: name.into(),
            input: Box::new(input),
        }
    }

    /// A DESCRIBE wrapper over a child
    pub fn describe_query(format: DescribeFormat, input: LogicalPlan) -> LogicalPlan {
        LogicalPlan::DescribeQuery {
            format,
            input: Box::new(input),
        }
    }

    /// An INSERT over a child
    pub fn insert_into(
        table: impl Into<String>,
        columns: Vec<String>,
        input: LogicalPlan,
    ) -> LogicalPlan {
        LogicalPlan::InsertInto {
            table: table.into(),
            columns,
            input: Box::new(input),
        }
    }

    /// A decorator wrapper over a child
    pub fn decorator(
        kind: DecorationKind,
        label: impl Into<String>,
        input: LogicalPlan,
    ) -> LogicalPlan {
        LogicalPlan::Decorator {
            kind,
            label: label.into(),
            input: Box::new(input),
        }
    }

    // ============ Schema ============

    /// The schema this node produces
    pub fn schema(&self) -> Schema {
        match self {
            LogicalPlan::UnresolvedTable { .. } => Schema::new(),
            LogicalPlan::ResolvedTable { source } => source.schema().clone(),
            LogicalPlan::Project { expressions, .. } => derive_schema(expressions),
            LogicalPlan::GroupBy { selected, .. } => derive_schema(selected),
            LogicalPlan::Filter { input, .. } => input.schema(),
            LogicalPlan::Join {
                join_type,
                left,
                right,
                ..
            }
            | LogicalPlan::IndexedJoin {
                join_type,
                left,
                right,
                ..
            } => {
                let mut schema = match join_type {
                    JoinType::Right => left.schema().as_nullable(),
                    _ => left.schema(),
                };
                let right_schema = match join_type {
                    JoinType::Left => right.schema().as_nullable(),
                    _ => right.schema(),
                };
                schema.extend(right_schema);
                schema
            }
            LogicalPlan::TableAlias { name, input } => input.schema().with_source(name),
            LogicalPlan::SubqueryAlias { name, input } => input.schema().with_source(name),
            LogicalPlan::DescribeQuery { .. } => {
                Schema::from(vec![Column::new("plan", "", DataType::Text).nullable(false)])
            }
            LogicalPlan::InsertInto { .. } => Schema::new(),
            LogicalPlan::Decorator { input, .. } => input.schema(),
        }
    }

    /// Check that every table reference is bound to a source
    pub fn resolved(&self) -> bool {
        if matches!(self, LogicalPlan::UnresolvedTable { .. }) {
            return false;
        }
        self.children().iter().all(|c| c.resolved())
    }

    // ============ Structure ============

    /// Child nodes, in order
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::UnresolvedTable { .. } | LogicalPlan::ResolvedTable { .. } => vec![],
            LogicalPlan::Project { input, .. }
            | LogicalPlan::GroupBy { input, .. }
            | LogicalPlan::Filter { input, .. }
            | LogicalPlan::TableAlias { input, .. }
            | LogicalPlan::SubqueryAlias { input, .. }
            | LogicalPlan::DescribeQuery { input, .. }
            | LogicalPlan::InsertInto { input, .. }
            | LogicalPlan::Decorator { input, .. } => vec![input.as_ref()],
            LogicalPlan::Join { left, right, .. }
            | LogicalPlan::IndexedJoin { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
        }
    }

    /// Rebuild this node with new children, preserving its shape
    ///
    /// The number of children must match the node's arity.
    pub fn with_children(self, children: Vec<LogicalPlan>) -> PlanResult<LogicalPlan> {
        let arity = self.children().len();
        if children.len() != arity {
            return Err(PlanError::InvalidPlan(format!(
                "node expects {} children, got {}",
                arity,
                children.len()
            )));
        }
        let mut children = children.into_iter();
        Ok(match self {
            leaf @ (LogicalPlan::UnresolvedTable { .. } | LogicalPlan::ResolvedTable { .. }) => {
                leaf
            }
            LogicalPlan::Project { expressions, .. } => LogicalPlan::Project {
                expressions,
                input: Box::new(children.next().unwrap()),
            },
            LogicalPlan::GroupBy {
                selected, grouping, ..
            } => LogicalPlan::GroupBy {
                selected,
                grouping,
                input: Box::new(children.next().unwrap()),
            },
            LogicalPlan::Filter { predicate, .. } => LogicalPlan::Filter {
                predicate,
                input: Box::new(children.next().unwrap()),
            },
            LogicalPlan::Join {
                join_type,
                condition,
                ..
            } => LogicalPlan::Join {
                join_type,
                condition,
                left: Box::new(children.next().unwrap()),
                right: Box::new(children.next().unwrap()),
            },
            LogicalPlan::IndexedJoin {
                join_type,
                condition,
                key_exprs,
                index,
                ..
            } => LogicalPlan::IndexedJoin {
                join_type,
                condition,
                key_exprs,
                index,
                left: Box::new(children.next().unwrap()),
                right: Box::new(children.next().unwrap()),
            },
            LogicalPlan::TableAlias { name, .. } => LogicalPlan::TableAlias {
                name,
                input: Box::new(children.next().unwrap()),
            },
            LogicalPlan::SubqueryAlias { name, .. } => LogicalPlan::SubqueryAlias {
                name,
                input: Box::new(children.next().unwrap()),
            },
            LogicalPlan::DescribeQuery { format, .. } => LogicalPlan::DescribeQuery {
                format,
                input: Box::new(children.next().unwrap()),
            },
            LogicalPlan::InsertInto { table, columns, .. } => LogicalPlan::InsertInto {
                table,
                columns,
                input: Box::new(children.next().unwrap()),
            },
            LogicalPlan::Decorator { kind, label, .. } => LogicalPlan::Decorator {
                kind,
                label,
                input: Box::new(children.next().unwrap()),
            },
        })
    }

    // ============ Expressions ============

    /// Whether this node kind carries expressions
    pub fn is_expression_carrying(&self) -> bool {
        matches!(
            self,
            LogicalPlan::Project { .. }
                | LogicalPlan::GroupBy { .. }
                | LogicalPlan::Filter { .. }
                | LogicalPlan::Join { .. }
                | LogicalPlan::IndexedJoin { .. }
        )
    }

    /// The expressions held directly by this node
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            LogicalPlan::Project { expressions, .. } => expressions.iter().collect(),
            LogicalPlan::GroupBy {
                selected, grouping, ..
            } => selected.iter().chain(grouping.iter()).collect(),
            LogicalPlan::Filter { predicate, .. } => vec![predicate],
            LogicalPlan::Join { condition, .. } => condition.iter().collect(),
            LogicalPlan::IndexedJoin {
                condition,
                key_exprs,
                ..
            } => std::iter::once(condition).chain(key_exprs.iter()).collect(),
            _ => vec![],
        }
    }

    /// Rebuild this node, applying a fallible function to each of its
    /// expressions (recursion into expression subtrees is up to `f`)
    pub fn map_expressions<F>(self, f: &mut F) -> PlanResult<LogicalPlan>
    where
        F: FnMut(Expr) -> PlanResult<Expr>,
    {
        Ok(match self {
            LogicalPlan::Project { expressions, input } => LogicalPlan::Project {
                expressions: expressions
                    .into_iter()
                    .map(&mut *f)
                    .collect::<PlanResult<Vec<_>>>()?,
                input,
            },
            LogicalPlan::GroupBy {
                selected,
                grouping,
                input,
            } => LogicalPlan::GroupBy {
                selected: selected
                    .into_iter()
                    .map(&mut *f)
                    .collect::<PlanResult<Vec<_>>>()?,
                grouping: grouping
                    .into_iter()
                    .map(&mut *f)
                    .collect::<PlanResult<Vec<_>>>()?,
                input,
            },
            LogicalPlan::Filter { predicate, input } => LogicalPlan::Filter {
                predicate: f(predicate)?,
                input,
            },
            LogicalPlan::Join {
                join_type,
                condition,
                left,
                right,
            } => LogicalPlan::Join {
                join_type,
                condition: condition.map(&mut *f).transpose()?,
                left,
                right,
            },
            LogicalPlan::IndexedJoin {
                join_type,
                condition,
                key_exprs,
                index,
                left,
                right,
            } => LogicalPlan::IndexedJoin {
                join_type,
                condition: f(condition)?,
                key_exprs: key_exprs
                    .into_iter()
                    .map(&mut *f)
                    .collect::<PlanResult<Vec<_>>>()?,
                index,
                left,
                right,
            },
            other => other,
        })
    }

    // ============ Traversal ============

    /// Visit nodes top-down; returning `false` stops descent into a
    /// node's children
    pub fn inspect<F>(&self, f: &mut F)
    where
        F: FnMut(&LogicalPlan) -> bool,
    {
        if f(self) {
            for child in self.children() {
                child.inspect(f);
            }
        }
    }

    /// Rebuild the tree bottom-up, applying a fallible function to
    /// every node after its children have been rebuilt
    pub fn transform_up<F>(self, f: &mut F) -> PlanResult<LogicalPlan>
    where
        F: FnMut(LogicalPlan) -> PlanResult<LogicalPlan>,
    {
        let rebuilt = match self {
            leaf @ (LogicalPlan::UnresolvedTable { .. } | LogicalPlan::ResolvedTable { .. }) => {
                leaf
            }
            LogicalPlan::Project { expressions, input } => LogicalPlan::Project {
                expressions,
                input: Box::new(input.transform_up(f)?),
            },
            LogicalPlan::GroupBy {
                selected,
                grouping,
                input,
            } => LogicalPlan::GroupBy {
                selected,
                grouping,
                input: Box::new(input.transform_up(f)?),
            },
            LogicalPlan::Filter { predicate, input } => LogicalPlan::Filter {
                predicate,
                input: Box::new(input.transform_up(f)?),
            },
            LogicalPlan::Join {
                join_type,
                condition,
                left,
                right,
            } => LogicalPlan::Join {
                join_type,
                condition,
                left: Box::new(left.transform_up(f)?),
                right: Box::new(right.transform_up(f)?),
            },
            LogicalPlan::IndexedJoin {
                join_type,
                condition,
                key_exprs,
                index,
                left,
                right,
            } => LogicalPlan::IndexedJoin {
                join_type,
                condition,
                key_exprs,
                index,
                left: Box::new(left.transform_up(f)?),
                right: Box::new(right.transform_up(f)?),
            },
            LogicalPlan::TableAlias { name, input } => LogicalPlan::TableAlias {
                name,
                input: Box::new(input.transform_up(f)?),
            },
            LogicalPlan::SubqueryAlias { name, input } => LogicalPlan::SubqueryAlias {
                name,
                input: Box::new(input.transform_up(f)?),
            },
            LogicalPlan::DescribeQuery { format, input } => LogicalPlan::DescribeQuery {
                format,
                input: Box::new(input.transform_up(f)?),
            },
            LogicalPlan::InsertInto {
                table,
                columns,
                input,
            } => LogicalPlan::InsertInto {
                table,
                columns,
                input: Box::new(input.transform_up(f)?),
            },
            LogicalPlan::Decorator { kind, label, input } => LogicalPlan::Decorator {
                kind,
                label,
                input: Box::new(input.transform_up(f)?),
            },
        };
        f(rebuilt)
    }

    /// Format the plan as an indented tree
    pub fn explain(&self) -> String {
        ExplainOutput::format(self)
    }
}

/// Derive the output schema of a projection-like expression list
fn derive_schema(expressions: &[Expr]) -> Schema {
    expressions
        .iter()
        .map(|e| match e {
            Expr::Column(col) => Column {
                name: col.name.clone(),
                source: col.table.clone(),
                data_type: col.data_type.clone(),
                nullable: col.nullable,
                primary_key: false,
            },
            other => Column::new(other.to_string(), "", other.data_type())
                .nullable(other.is_nullable()),
        })
        .collect()
}
