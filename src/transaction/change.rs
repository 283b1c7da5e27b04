// ============================================================================
// Pending change tracking
// ============================================================================
//
// Each `Change` is one write recorded by a context. Changes are applied to
// the context's working snapshot immediately (read-your-writes) and handed
// to the store as one ordered list on commit.
//
// ============================================================================

use crate::core::ObjectId;
use crate::entity::Record;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A record not previously known to the context.
    Insert { record: Arc<Record> },

    /// New field values for a record the context already tracks.
    Update { old: Arc<Record>, new: Arc<Record> },

    /// Removal of a tracked record.
    Delete { old: Arc<Record> },
}

impl Change {
    /// Entity type affected by this change
    pub fn entity(&self) -> &str {
        self.record().entity()
    }

    pub fn id(&self) -> ObjectId {
        self.record().id()
    }

    /// The record as it looks after the change (before it, for deletes).
    pub fn record(&self) -> &Arc<Record> {
        match self {
            Change::Insert { record } => record,
            Change::Update { new, .. } => new,
            Change::Delete { old } => old,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Change::Delete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Document;

    #[test]
    fn test_change_accessors() {
        let record = Arc::new(Record::new(ObjectId::new(), "student", 1, Document::new()));
        let insert = Change::Insert {
            record: Arc::clone(&record),
        };
        assert_eq!(insert.entity(), "student");
        assert_eq!(insert.id(), record.id());
        assert!(!insert.is_delete());

        let delete = Change::Delete { old: record };
        assert!(delete.is_delete());
    }
}
