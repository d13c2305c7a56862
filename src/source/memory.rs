//! In-memory table source
//!
//! A pure, catalog-free source used by the optimizer tests and by
//! embedders that want a table without a storage layer behind it. The
//! plain constructor exposes only the index capability; `with_pushdown`
//! additionally advertises projection and filter absorption.

use std::sync::Arc;

use crate::catalog::Schema;
use crate::error::{PlanError, PlanResult};
use crate::plan::expr::Expr;
use crate::source::{
    FilteredSource, IndexHandle, IndexLookup, IndexedSource, ProjectedSource, Source, SourceRef,
};

/// An in-memory table source
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    schema: Schema,
    pushdown: bool,
    projection: Option<Vec<String>>,
    filters: Vec<Expr>,
    indexes: Vec<IndexHandle>,
    lookup: Option<IndexLookup>,
}

impl MemorySource {
    /// Create a new source with the given declared schema
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            pushdown: false,
            projection: None,
            filters: Vec::new(),
            indexes: Vec::new(),
            lookup: None,
        }
    }

    /// Advertise projection and filter absorption
    #[must_use]
    pub fn with_pushdown(mut self) -> Self {
        self.pushdown = true;
        self
    }

    /// Declare an index over the primary-key columns
    #[must_use]
    pub fn with_primary_key_index(mut self) -> Self {
        let pk: Vec<String> = self
            .schema
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        if !pk.is_empty() {
            self.indexes.push(IndexHandle::new(&self.name, pk).primary());
        }
        self
    }

    /// Declare an index over the given columns, in prefix order
    #[must_use]
    pub fn with_index(mut self, columns: &[&str]) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        self.indexes.push(IndexHandle::new(&self.name, columns));
        self
    }

    /// Wrap into a shared source handle
    pub fn into_ref(self) -> SourceRef {
        Arc::new(self)
    }
}

impl Source for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn as_projected(&self) -> Option<&dyn ProjectedSource> {
        if self.pushdown {
            Some(self)
        } else {
            None
        }
    }

    fn as_filtered(&self) -> Option<&dyn FilteredSource> {
        if self.pushdown {
            Some(self)
        } else {
            None
        }
    }

    fn as_indexed(&self) -> Option<&dyn IndexedSource> {
        Some(self)
    }

    fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    fn filters(&self) -> &[Expr] {
        &self.filters
    }

    fn index_lookup(&self) -> Option<&IndexLookup> {
        self.lookup.as_ref()
    }
}

impl ProjectedSource for MemorySource {
    fn with_projection(&self, columns: &[String]) -> PlanResult<SourceRef> {
        let mut schema = Schema::new();
        for name in columns {
            match self.schema.iter().find(|c| &c.name == name) {
                Some(col) => schema.push(col.clone()),
                None => {
                    return Err(PlanError::Source(format!(
                        "table '{}' has no column '{}'",
                        self.name, name
                    )))
                }
            }
        }
        let mut source = self.clone();
        source.schema = schema;
        source.projection = Some(columns.to_vec());
        Ok(Arc::new(source))
    }
}

impl FilteredSource for MemorySource {
    // Absorbs every predicate it is offered; offered predicates only
    // reference this table's columns.
    fn handled_filters(&self, filters: &[Expr]) -> Vec<Expr> {
        filters.to_vec()
    }

    fn with_filters(&self, filters: Vec<Expr>) -> PlanResult<SourceRef> {
        let mut source = self.clone();
        source.filters.extend(filters);
        Ok(Arc::new(source))
    }
}

impl IndexedSource for MemorySource {
    fn indexes(&self) -> Vec<IndexHandle> {
        self.indexes.clone()
    }

    fn with_index_lookup(&self, lookup: IndexLookup) -> PlanResult<SourceRef> {
        let mut source = self.clone();
        source.lookup = Some(lookup);
        Ok(Arc::new(source))
    }
}
