use crate::core::ObjectId;
use crate::entity::Record;
use crate::transaction::Change;
use std::sync::Arc;

/// Records of one entity type, keyed by id.
pub type EntityTable = im::OrdMap<ObjectId, Arc<Record>>;

/// Immutable view of the whole store at one committed version.
///
/// Backed by persistent maps: cloning is O(1) and modifications of a clone
/// share structure with the original.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    version: u64,
    tables: im::HashMap<String, EntityTable>,
}

impl StoreSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a snapshot from a flat record list (snapshot-file restore).
    pub fn from_records(version: u64, records: impl IntoIterator<Item = Record>) -> Self {
        let mut snapshot = Self {
            version,
            tables: im::HashMap::new(),
        };
        for record in records {
            snapshot.put(Arc::new(record));
        }
        snapshot
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn get(&self, entity: &str, id: ObjectId) -> Option<&Arc<Record>> {
        self.tables.get(entity)?.get(&id)
    }

    /// Looks a record up by id across every entity type.
    pub fn find(&self, id: ObjectId) -> Option<&Arc<Record>> {
        self.tables.values().find_map(|table| table.get(&id))
    }

    /// Records of `entity` in id order (not store order).
    pub fn records<'a>(&'a self, entity: &str) -> impl Iterator<Item = &'a Arc<Record>> + 'a {
        self.tables
            .get(entity)
            .into_iter()
            .flat_map(|table| table.values())
    }

    pub fn all_records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.tables.values().flat_map(|table| table.values())
    }

    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self, entity: &str) -> usize {
        self.tables.get(entity).map(|table| table.len()).unwrap_or(0)
    }

    pub fn record_count(&self) -> usize {
        self.tables.values().map(|table| table.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    pub fn max_sequence(&self) -> Option<u64> {
        self.all_records().map(|record| record.sequence()).max()
    }

    pub(crate) fn put(&mut self, record: Arc<Record>) {
        let id = record.id();
        match self.tables.get_mut(record.entity()) {
            Some(table) => {
                table.insert(id, record);
            }
            None => {
                let entity = record.entity().to_string();
                self.tables.insert(entity, EntityTable::unit(id, record));
            }
        }
    }

    pub(crate) fn remove(&mut self, entity: &str, id: ObjectId) -> Option<Arc<Record>> {
        let table = self.tables.get_mut(entity)?;
        let removed = table.remove(&id);
        if table.is_empty() {
            self.tables.remove(entity);
        }
        removed
    }

    /// Applies a change without validation: an update of a record that is
    /// no longer present is skipped.
    pub(crate) fn apply(&mut self, change: &Change) {
        match change {
            Change::Insert { record } => self.put(Arc::clone(record)),
            Change::Update { new, .. } => {
                if self.get(new.entity(), new.id()).is_some() {
                    self.put(Arc::clone(new));
                }
            }
            Change::Delete { old } => {
                self.remove(old.entity(), old.id());
            }
        }
    }

    /// `base` with `changes` replayed on top.
    pub(crate) fn rebased(base: &StoreSnapshot, changes: &[Change]) -> StoreSnapshot {
        let mut working = base.clone();
        for change in changes {
            working.apply(change);
        }
        working
    }
}
