//! Table sources and their optional capabilities
//!
//! A source is the leaf a resolved plan reads from. Beyond exposing a
//! schema, a source may advertise capabilities that let the optimizer
//! hand it pre-restricted work: a reduced column set, absorbed filter
//! predicates, or an index lookup. Capabilities are discovered by
//! attempting the interface; a source that does not advertise one gets
//! identity behavior.

pub mod memory;

pub use memory::MemorySource;

use std::fmt;
use std::sync::Arc;

use crate::catalog::Schema;
use crate::error::{PlanError, PlanResult};
use crate::plan::expr::{Expr, Literal};

/// Shared handle to a table source
pub type SourceRef = Arc<dyn Source>;

/// A table source
///
/// `with_*` capability methods return new source values; sources are
/// pure during optimization and perform no reads.
pub trait Source: fmt::Debug + Send + Sync {
    /// Table name
    fn name(&self) -> &str;

    /// The source's current visible schema
    fn schema(&self) -> &Schema;

    /// Projection capability, if advertised
    fn as_projected(&self) -> Option<&dyn ProjectedSource> {
        None
    }

    /// Filter-absorption capability, if advertised
    fn as_filtered(&self) -> Option<&dyn FilteredSource> {
        None
    }

    /// Index capability, if advertised
    fn as_indexed(&self) -> Option<&dyn IndexedSource> {
        None
    }

    /// The column names pushed into this source, if any
    fn projection(&self) -> Option<&[String]> {
        None
    }

    /// The filter predicates absorbed by this source
    fn filters(&self) -> &[Expr] {
        &[]
    }

    /// The index lookup attached to this source, if any
    fn index_lookup(&self) -> Option<&IndexLookup> {
        None
    }
}

/// A source that can absorb a column projection
pub trait ProjectedSource: Source {
    /// A new source restricted to `columns`, in `columns` order
    fn with_projection(&self, columns: &[String]) -> PlanResult<SourceRef>;
}

/// A source that can absorb filter predicates
pub trait FilteredSource: Source {
    /// The subset of `filters` this source will absorb
    fn handled_filters(&self, filters: &[Expr]) -> Vec<Expr>;

    /// A new source recording `filters` as absorbed
    fn with_filters(&self, filters: Vec<Expr>) -> PlanResult<SourceRef>;
}

/// A source that exposes indexes
pub trait IndexedSource: Source {
    /// The declared indexes, primary key first where one exists
    fn indexes(&self) -> Vec<IndexHandle>;

    /// A new source carrying an index lookup
    fn with_index_lookup(&self, lookup: IndexLookup) -> PlanResult<SourceRef>;
}

/// A declared index: a named column list in prefix order
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHandle {
    /// Index display name, e.g. `mytable.f`
    pub name: String,
    /// Table the index belongs to
    pub table: String,
    /// Indexed columns in prefix order
    pub columns: Vec<String>,
    /// Whether this is the primary-key index
    pub primary: bool,
}

impl IndexHandle {
    /// Create a new index handle named `table.col1_col2_...`
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        let table = table.into();
        let name = format!("{}.{}", table, columns.join("_"));
        Self {
            name,
            table,
            columns,
            primary: false,
        }
    }

    /// Mark as the primary-key index
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// The leading column of the index
    pub fn leading_column(&self) -> &str {
        &self.columns[0]
    }

    /// Build a lookup for a key prefix
    pub fn get(&self, key: &[Literal]) -> PlanResult<IndexLookup> {
        if key.is_empty() || key.len() > self.columns.len() {
            return Err(PlanError::Source(format!(
                "index '{}' takes 1..={} key values, got {}",
                self.name,
                self.columns.len(),
                key.len()
            )));
        }
        Ok(IndexLookup {
            index: self.name.clone(),
            key: key.to_vec(),
        })
    }
}

/// A handle that restricts a source's row stream at execution time
#[derive(Debug, Clone, PartialEq)]
pub struct IndexLookup {
    /// Name of the index that produced this lookup
    pub index: String,
    /// Key values, one per used index column
    pub key: Vec<Literal>,
}

impl fmt::Display for IndexLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key: Vec<String> = self.key.iter().map(|v| v.to_string()).collect();
        write!(f, "{}({})", self.index, key.join(", "))
    }
}
