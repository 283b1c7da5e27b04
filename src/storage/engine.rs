use super::table::StoreSnapshot;
use crate::core::{ObjectId, Result};
use crate::entity::{EntitySchema, Record};
use crate::transaction::{Change, ContextId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Entity store trait - allows pluggable storage backends.
///
/// A store owns the committed state of every entity. Contexts read
/// immutable snapshots from it and hand it ordered change lists to commit.
pub trait EntityStore: Send + Sync {
    /// Name the store was opened under.
    fn name(&self) -> &str;

    /// Latest committed snapshot.
    fn snapshot(&self) -> Result<StoreSnapshot>;

    /// Allocates the next store-order sequence number.
    fn next_sequence(&self) -> Result<u64>;

    /// Applies `changes` atomically: either every change is published or
    /// none is.
    fn commit(&self, origin: ContextId, changes: &[Change]) -> Result<CommitReceipt>;

    /// Removes every record of every entity type in one commit.
    fn clear(&self, origin: ContextId) -> Result<CommitReceipt>;

    /// Registers an observer of commits touching `entity`.
    ///
    /// `StoreObserver::attached` runs before this returns, with the snapshot
    /// the observer starts from; no commit can land in between.
    fn observe(&self, entity: &str, observer: Arc<dyn StoreObserver>) -> Result<ObserverId>;

    fn unobserve(&self, id: ObserverId);

    /// Closes the store. Every later operation fails.
    fn close(&self);

    fn is_open(&self) -> bool;

    /// Schema registered under `entity`, if any.
    fn schema(&self, entity: &str) -> Option<EntitySchema>;
}

/// Callback interface for commit notifications.
pub trait StoreObserver: Send + Sync {
    /// Called once while registering, with the snapshot observation starts from.
    fn attached(&self, snapshot: &StoreSnapshot) -> Result<()>;

    /// Called after every commit that touched the observed entity type.
    fn store_did_commit(&self, notification: &CommitNotification);
}

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    pub fn new() -> Self {
        ObserverId(NEXT_OBSERVER_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub version: u64,
    pub snapshot: StoreSnapshot,
}

/// Net effect of one commit on one record.
#[derive(Debug, Clone)]
pub struct EntityChange {
    pub id: ObjectId,
    pub before: Option<Arc<Record>>,
    pub after: Option<Arc<Record>>,
}

/// What observers are told after a commit.
#[derive(Debug, Clone)]
pub struct CommitNotification {
    pub version: u64,
    pub origin: ContextId,
    /// Changes grouped by entity type.
    pub changes: HashMap<String, Vec<EntityChange>>,
    /// Committed state right after this commit.
    pub snapshot: StoreSnapshot,
}

impl CommitNotification {
    /// Builds the per-record net effect of moving from `before` to `after`
    /// for the ids in `touched`.
    pub fn between(
        origin: ContextId,
        before: &StoreSnapshot,
        after: &StoreSnapshot,
        touched: impl IntoIterator<Item = (String, ObjectId)>,
    ) -> Self {
        let mut changes: HashMap<String, Vec<EntityChange>> = HashMap::new();
        let mut seen = std::collections::HashSet::new();

        for (entity, id) in touched {
            if !seen.insert((entity.clone(), id)) {
                continue;
            }
            let old = before.get(&entity, id).cloned();
            let new = after.get(&entity, id).cloned();
            if old.is_none() && new.is_none() {
                continue;
            }
            changes.entry(entity).or_default().push(EntityChange {
                id,
                before: old,
                after: new,
            });
        }

        Self {
            version: after.version(),
            origin,
            changes,
            snapshot: after.clone(),
        }
    }

    pub fn changes_for(&self, entity: &str) -> &[EntityChange] {
        self.changes.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Document;

    #[test]
    fn test_notification_drops_insert_then_delete() {
        let record = Arc::new(Record::new(ObjectId::new(), "student", 1, Document::new()));
        let mut after = StoreSnapshot::new();
        after.put(Arc::clone(&record));

        let transient = ObjectId::new();
        let notification = CommitNotification::between(
            ContextId::new(),
            &StoreSnapshot::new(),
            &after,
            vec![
                ("student".to_string(), record.id()),
                ("student".to_string(), transient),
                ("student".to_string(), record.id()),
            ],
        );

        let changes = notification.changes_for("student");
        assert_eq!(changes.len(), 1);
        assert!(changes[0].before.is_none());
        assert_eq!(changes[0].after.as_ref().map(|r| r.id()), Some(record.id()));
        assert!(notification.changes_for("course").is_empty());
    }
}
