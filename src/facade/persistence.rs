use super::handle::StoreHandle;
use crate::core::{ObjectId, PersistenceError, Result, SortDescriptor, StoreError};
use crate::entity::{self, Document, Entity, EntitySchema, Managed, Record};
use crate::executor::FetchRequest;
use crate::expression::Predicate;
use crate::observe::FetchedResultsController;
use crate::storage::StoreSnapshot;
use crate::transaction::{Change, ContextId, Savepoint};
use log::{debug, warn};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

/// One access context to a store.
///
/// Writes are staged as pending changes on a private copy of the committed
/// state and become visible to other contexts only when [`save`] (or the
/// outermost [`perform`]) commits them. Reads always see the context's own
/// pending writes.
///
/// A `Persistence` is neither `Send` nor `Sync`: it stays on the thread it
/// was created on. Other threads get their own from the [`StoreHandle`].
///
/// [`save`]: Persistence::save
/// [`perform`]: Persistence::perform
pub struct Persistence {
    store: StoreHandle,
    context: ContextId,
    /// Committed state the context last synchronized with
    base: StoreSnapshot,
    /// `base` + `pending`
    working: StoreSnapshot,
    pending: Vec<Change>,
    /// Nesting level of `perform`
    depth: usize,
    /// Incremented on every commit made by this context
    generation: u64,
    _not_send: PhantomData<Rc<()>>,
}

impl Persistence {
    /// Creates a context on `store`. Fails with `UninitializedPersistence`
    /// when the store has been closed.
    pub fn new(store: &StoreHandle) -> Result<Self> {
        let base = store.snapshot()?;
        let context = ContextId::new();
        debug!("Created {} on store '{}'", context, store.name());

        Ok(Self {
            store: store.clone(),
            context,
            working: base.clone(),
            base,
            pending: Vec::new(),
            depth: 0,
            generation: 0,
            _not_send: PhantomData,
        })
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_changes(&self) -> &[Change] {
        &self.pending
    }

    fn ensure_open(&self) -> Result<()> {
        if self.store.is_open() {
            Ok(())
        } else {
            Err(PersistenceError::UninitializedPersistence)
        }
    }

    // ========================================================================
    // Typed CRUD
    // ========================================================================

    /// Creates a default-initialized `T`, pending until the next save.
    pub fn insert<T: Entity>(&mut self) -> Result<Managed<T>> {
        self.ensure_open()?;
        let value = T::default();
        let record = self.stage_insert(T::ENTITY_NAME, entity::encode(&value)?)?;
        Ok(Managed::with_id(record.id(), value))
    }

    /// Every `T` in store order.
    pub fn fetch_all<T: Entity>(&self) -> Result<Vec<Managed<T>>> {
        self.fetch(Predicate::all(), &[])
    }

    /// Every `T` matching `predicate`, in store order.
    pub fn fetch_matching<T: Entity>(&self, predicate: Predicate) -> Result<Vec<Managed<T>>> {
        self.fetch(predicate, &[])
    }

    /// Every `T` matching `predicate`, ordered by `sort_descriptors`
    /// left to right with store order breaking ties.
    pub fn fetch<T: Entity>(
        &self,
        predicate: Predicate,
        sort_descriptors: &[SortDescriptor],
    ) -> Result<Vec<Managed<T>>> {
        self.ensure_open()?;
        let request = FetchRequest::new(T::ENTITY_NAME)
            .filter(predicate)
            .order_by(sort_descriptors.to_vec());

        request
            .execute(&self.working)?
            .iter()
            .map(|record| entity::decode(record))
            .collect()
    }

    pub fn count<T: Entity>(&self, predicate: Predicate) -> Result<usize> {
        self.ensure_open()?;
        let request = FetchRequest::new(T::ENTITY_NAME).filter(predicate);
        Ok(request.execute(&self.working)?.len())
    }

    /// Looks up a `T` by identity.
    pub fn find<T: Entity>(&self, id: ObjectId) -> Result<Option<Managed<T>>> {
        self.ensure_open()?;
        self.working
            .get(T::ENTITY_NAME, id)
            .map(|record| entity::decode(record))
            .transpose()
    }

    pub fn delete<T: Entity>(&mut self, object: &Managed<T>) -> Result<()> {
        self.ensure_open()?;
        self.stage_delete(T::ENTITY_NAME, object.id())
    }

    /// Inserts `object` if this context does not track it yet, otherwise
    /// replaces the stored field values with the object's.
    pub fn add_or_update<T: Entity>(&mut self, object: &Managed<T>) -> Result<()> {
        self.add_or_update_all(std::slice::from_ref(object))
    }

    /// Upserts every object, or none of them if one fails.
    pub fn add_or_update_all<T: Entity>(&mut self, objects: &[Managed<T>]) -> Result<()> {
        self.ensure_open()?;
        let documents = objects
            .iter()
            .map(|object| Ok((object.id(), entity::encode(object.value())?)))
            .collect::<Result<Vec<_>>>()?;
        self.stage_upserts(T::ENTITY_NAME, documents)
    }

    // ========================================================================
    // Schema-driven records
    // ========================================================================

    fn registered_schema(&self, entity: &str) -> Result<EntitySchema> {
        self.store
            .store()
            .schema(entity)
            .ok_or(PersistenceError::WrongEntityType)
    }

    /// Creates a record of a registered entity type from its default document.
    pub fn insert_record(&mut self, entity: &str) -> Result<Record> {
        self.ensure_open()?;
        let schema = self.registered_schema(entity)?;
        let record = self.stage_insert(schema.name(), schema.default_document().clone())?;
        Ok(record.as_ref().clone())
    }

    pub fn fetch_records(
        &self,
        entity: &str,
        predicate: Predicate,
        sort_descriptors: &[SortDescriptor],
    ) -> Result<Vec<Record>> {
        self.ensure_open()?;
        self.registered_schema(entity)?;
        let request = FetchRequest::new(entity)
            .filter(predicate)
            .order_by(sort_descriptors.to_vec());

        Ok(request
            .execute(&self.working)?
            .iter()
            .map(|record| record.as_ref().clone())
            .collect())
    }

    pub fn add_or_update_record(&mut self, record: &Record) -> Result<()> {
        self.ensure_open()?;
        self.registered_schema(record.entity())?;
        self.stage_upserts(record.entity(), vec![(record.id(), record.document().clone())])
    }

    pub fn delete_record(&mut self, record: &Record) -> Result<()> {
        self.ensure_open()?;
        self.registered_schema(record.entity())?;
        self.stage_delete(record.entity(), record.id())
    }

    // ========================================================================
    // Staging
    // ========================================================================

    fn stage(&mut self, change: Change) {
        self.working.apply(&change);
        self.pending.push(change);
    }

    fn stage_insert(&mut self, entity: &str, document: Document) -> Result<Arc<Record>> {
        let sequence = self.store.store().next_sequence()?;
        let record = Arc::new(Record::new(ObjectId::new(), entity, sequence, document));
        self.stage(Change::Insert {
            record: Arc::clone(&record),
        });
        Ok(record)
    }

    fn stage_delete(&mut self, entity: &str, id: ObjectId) -> Result<()> {
        match self.working.get(entity, id) {
            Some(old) => {
                let old = Arc::clone(old);
                self.stage(Change::Delete { old });
                Ok(())
            }
            None if self.working.find(id).is_some() => Err(PersistenceError::WrongEntityType),
            None => Err(StoreError::EntityNotFound {
                entity: entity.to_string(),
                id: id.to_string(),
            }
            .into()),
        }
    }

    /// Prepares every upsert against a scratch copy first; nothing is staged
    /// unless all of them succeed.
    fn stage_upserts(&mut self, entity: &str, documents: Vec<(ObjectId, Document)>) -> Result<()> {
        let mut scratch = self.working.clone();
        let mut changes = Vec::with_capacity(documents.len());

        for (id, document) in documents {
            let change = match scratch.get(entity, id) {
                Some(old) if old.document() == &document => continue,
                Some(old) => Change::Update {
                    new: Arc::new(old.with_document(document)),
                    old: Arc::clone(old),
                },
                None if scratch.find(id).is_some() => return Err(PersistenceError::WrongEntityType),
                None => {
                    let sequence = self.store.store().next_sequence()?;
                    Change::Insert {
                        record: Arc::new(Record::new(id, entity, sequence, document)),
                    }
                }
            };
            scratch.apply(&change);
            changes.push(change);
        }

        self.working = scratch;
        self.pending.extend(changes);
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Commits every pending change as one unit.
    ///
    /// On failure the pending changes are kept; call [`rollback`] to drop
    /// them or [`refresh`] to rebase them onto the latest committed state.
    ///
    /// [`rollback`]: Persistence::rollback
    /// [`refresh`]: Persistence::refresh
    pub fn save(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.pending.is_empty() {
            return Ok(());
        }

        let receipt = self.store.store().commit(self.context, &self.pending)?;
        debug!(
            "{} saved {} changes as version {}",
            self.context,
            self.pending.len(),
            receipt.version
        );

        self.pending.clear();
        self.working = receipt.snapshot.clone();
        self.base = receipt.snapshot;
        self.generation += 1;
        Ok(())
    }

    /// Discards every pending change.
    pub fn rollback(&mut self) {
        self.pending.clear();
        self.working = self.base.clone();
    }

    fn savepoint(&self) -> Savepoint {
        Savepoint {
            pending_len: self.pending.len(),
            generation: self.generation,
        }
    }

    fn rollback_to(&mut self, savepoint: Savepoint) {
        let retained = savepoint.retained(self.generation);
        if retained < self.pending.len() {
            debug!(
                "{} rolling back {} changes",
                self.context,
                self.pending.len() - retained
            );
        }
        self.pending.truncate(retained);
        self.working = StoreSnapshot::rebased(&self.base, &self.pending);
    }

    /// Runs `block` as one unit of work on this context.
    ///
    /// The outermost `perform` saves when the block succeeds. When the block
    /// (or that save) fails, every write made since the block started is
    /// discarded and the error is returned. Nested calls only discard their
    /// own writes on failure and leave the commit to the outermost call.
    ///
    /// ```
    /// use memopersist::{Entity, PersistenceError, StoreConfig, StoreHandle};
    /// use serde::{Deserialize, Serialize};
    ///
    /// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    /// struct Person {
    ///     name: String,
    /// }
    ///
    /// impl Entity for Person {
    ///     const ENTITY_NAME: &'static str = "person";
    /// }
    ///
    /// # fn main() -> memopersist::Result<()> {
    /// let store = StoreHandle::open(StoreConfig::in_memory("people"))?;
    /// let mut persistence = store.persistence()?;
    ///
    /// persistence.perform(|p| {
    ///     let mut person = p.insert::<Person>()?;
    ///     person.name = "Alice".into();
    ///     p.add_or_update(&person)
    /// })?;
    ///
    /// let failed: Result<(), PersistenceError> = persistence.perform(|p| {
    ///     p.insert::<Person>()?;
    ///     Err(PersistenceError::WrongEntityType)
    /// });
    /// assert!(failed.is_err());
    /// assert_eq!(persistence.fetch_all::<Person>()?.len(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn perform<F, R, E>(&mut self, block: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut Persistence) -> std::result::Result<R, E>,
        E: From<PersistenceError>,
    {
        self.ensure_open()?;
        let savepoint = self.savepoint();

        self.depth += 1;
        let result = block(self);
        self.depth -= 1;

        let outcome = match result {
            Ok(value) if self.depth == 0 => self.save().map(|_| value).map_err(E::from),
            other => other,
        };

        if outcome.is_err() {
            self.rollback_to(savepoint);
        }
        outcome
    }

    /// Re-reads the committed state and replays pending changes on top of it.
    ///
    /// Pending updates of records deleted elsewhere are dropped from the
    /// working view (the next save reports the conflict). Never fails: on a
    /// closed store the context is left as it was.
    pub fn refresh(&mut self) {
        match self.store.snapshot() {
            Ok(snapshot) => {
                self.working = StoreSnapshot::rebased(&snapshot, &self.pending);
                self.base = snapshot;
            }
            Err(e) => warn!("{} could not refresh: {}", self.context, e),
        }
    }

    /// Removes every record of every entity type from the store, at once.
    ///
    /// Pending changes of this context are discarded.
    pub fn clear_all_records(&mut self) -> Result<()> {
        self.ensure_open()?;
        let receipt = self.store.store().clear(self.context)?;

        self.pending.clear();
        self.working = receipt.snapshot.clone();
        self.base = receipt.snapshot;
        self.generation += 1;
        Ok(())
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Live query over the committed state of `T`.
    ///
    /// `section_name_key_path` groups results by a scalar field of `T`;
    /// anything else fails with `InvalidSectionNameKeyPath`. The controller
    /// is unloaded until [`FetchedResultsController::perform_fetch`].
    ///
    /// The key path is checked against `T::default()`. An `Option<Struct>`
    /// field that defaults to `None` passes the check, but every record
    /// then lands in the null section since structs have no scalar value.
    /// Paths below such a field are rejected. See [`EntitySchema::is_groupable`].
    pub fn fetched_results_controller<T: Entity>(
        &self,
        predicate: Predicate,
        sort_descriptors: Vec<SortDescriptor>,
        section_name_key_path: Option<&str>,
    ) -> Result<FetchedResultsController<T>> {
        self.ensure_open()?;

        if let Some(key_path) = section_name_key_path
            && !EntitySchema::of::<T>()?.is_groupable(key_path)
        {
            return Err(PersistenceError::InvalidSectionNameKeyPath);
        }

        let request = FetchRequest::new(T::ENTITY_NAME)
            .filter(predicate)
            .order_by(sort_descriptors);
        Ok(FetchedResultsController::new(
            self.store.clone(),
            request,
            section_name_key_path.map(str::to_string),
        ))
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("context", &self.context)
            .field("store", &self.store.name())
            .field("pending", &self.pending.len())
            .field("depth", &self.depth)
            .finish()
    }
}
