// ============================================================================
// src/executor/fetch.rs - Fetch execution
// ============================================================================
//
// Scan -> filter -> order, over one snapshot:
//   1. scan the entity table
//   2. keep records matching the predicate
//   3. order by store sequence, then by the sort descriptors
//
// ============================================================================

use super::sort::SortExecutor;
use crate::core::{Result, SortDescriptor};
use crate::entity::Record;
use crate::expression::Predicate;
use crate::storage::StoreSnapshot;
use std::sync::Arc;

/// A fetch definition: entity type, filter and ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub entity: String,
    pub predicate: Predicate,
    pub sort_descriptors: Vec<SortDescriptor>,
}

impl FetchRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicate: Predicate::all(),
            sort_descriptors: Vec::new(),
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn order_by(mut self, sort_descriptors: Vec<SortDescriptor>) -> Self {
        self.sort_descriptors = sort_descriptors;
        self
    }

    /// True when `record` belongs to the result set.
    pub fn includes(&self, record: &Record) -> Result<bool> {
        if record.entity() != self.entity {
            return Ok(false);
        }
        self.predicate.matches(record)
    }

    pub fn execute(&self, snapshot: &StoreSnapshot) -> Result<Vec<Arc<Record>>> {
        execute_fetch(snapshot, self)
    }
}

pub fn execute_fetch(
    snapshot: &StoreSnapshot,
    request: &FetchRequest,
) -> Result<Vec<Arc<Record>>> {
    let mut matched = Vec::new();
    for record in snapshot.records(&request.entity) {
        if request.predicate.matches(record)? {
            matched.push(Arc::clone(record));
        }
    }

    SortExecutor::sort(&mut matched, &request.sort_descriptors);
    Ok(matched)
}
