use super::diff::{self, ChangeBatch};
use super::results::{ResultsSnapshot, SectionInfo};
use super::stream::ChangeStream;
use crate::core::{IndexPath, ObjectId, PersistenceError, Result, StoreError};
use crate::entity::{self, Entity, Managed};
use crate::executor::FetchRequest;
use crate::facade::StoreHandle;
use crate::storage::{CommitNotification, ObserverId, StoreObserver, StoreSnapshot};
use log::{debug, warn};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Unloaded,
    Loaded,
    Disposed,
}

struct ControllerCore {
    state: ControllerState,
    results: ResultsSnapshot,
    /// Store version `results` reflect
    version: u64,
    subscribers: Vec<mpsc::UnboundedSender<ChangeBatch>>,
    observer: Option<ObserverId>,
}

/// The store-facing half of a controller: receives commit notifications
/// and turns them into change batches.
struct LiveQuery {
    request: FetchRequest,
    section_key: Option<String>,
    core: Mutex<ControllerCore>,
}

impl LiveQuery {
    fn lock(&self) -> MutexGuard<'_, ControllerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, snapshot: &StoreSnapshot) -> Result<ResultsSnapshot> {
        let records = self.request.execute(snapshot)?;
        Ok(ResultsSnapshot::build(records, self.section_key.as_deref()))
    }
}

impl StoreObserver for LiveQuery {
    fn attached(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let results = self.load(snapshot)?;
        let mut core = self.lock();
        if core.state == ControllerState::Disposed {
            return Err(StoreError::Disposed.into());
        }

        core.results = results;
        core.version = snapshot.version();
        core.state = ControllerState::Loaded;
        Ok(())
    }

    fn store_did_commit(&self, notification: &CommitNotification) {
        let touched: Vec<ObjectId> = notification
            .changes_for(&self.request.entity)
            .iter()
            .map(|change| change.id)
            .collect();
        if touched.is_empty() {
            return;
        }

        let mut core = self.lock();
        if core.state != ControllerState::Loaded || notification.version <= core.version {
            return;
        }

        let results = match self.load(&notification.snapshot) {
            Ok(results) => results,
            Err(e) => {
                warn!(
                    "Live query on '{}' skipped version {}: {}",
                    self.request.entity, notification.version, e
                );
                return;
            }
        };

        let batch = diff::diff(&core.results, &results, &touched, notification.version);
        core.results = results;
        core.version = notification.version;

        if !batch.is_empty() {
            core.subscribers
                .retain(|subscriber| subscriber.send(batch.clone()).is_ok());
        }
    }
}

/// Live, optionally sectioned view of the `T`s matching a fetch request.
///
/// Created unloaded by `Persistence::fetched_results_controller`. After
/// [`perform_fetch`](Self::perform_fetch) it follows every commit to the
/// store and publishes the differences to its subscribers. It reflects
/// committed state only, never a context's pending changes.
pub struct FetchedResultsController<T: Entity> {
    store: StoreHandle,
    query: Arc<LiveQuery>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> FetchedResultsController<T> {
    pub(crate) fn new(
        store: StoreHandle,
        request: FetchRequest,
        section_key: Option<String>,
    ) -> Self {
        let query = LiveQuery {
            request,
            section_key,
            core: Mutex::new(ControllerCore {
                state: ControllerState::Unloaded,
                results: ResultsSnapshot::default(),
                version: 0,
                subscribers: Vec::new(),
                observer: None,
            }),
        };

        Self {
            store,
            query: Arc::new(query),
            _entity: PhantomData,
        }
    }

    pub fn fetch_request(&self) -> &FetchRequest {
        &self.query.request
    }

    pub fn section_name_key_path(&self) -> Option<&str> {
        self.query.section_key.as_deref()
    }

    pub fn state(&self) -> ControllerState {
        self.query.lock().state
    }

    /// Loads the initial results and starts following the store.
    ///
    /// A no-op once loaded; fails with `StoreError::Disposed` after
    /// [`dispose`](Self::dispose).
    pub fn perform_fetch(&mut self) -> Result<()> {
        match self.state() {
            ControllerState::Loaded => return Ok(()),
            ControllerState::Disposed => return Err(StoreError::Disposed.into()),
            ControllerState::Unloaded => {}
        }

        let observer: Arc<dyn StoreObserver> = self.query.clone();
        let id = self
            .store
            .store()
            .observe(&self.query.request.entity, observer)?;

        let mut core = self.query.lock();
        if core.state == ControllerState::Disposed {
            drop(core);
            self.store.store().unobserve(id);
            return Err(StoreError::Disposed.into());
        }
        core.observer = Some(id);
        debug!(
            "Live query on '{}' loaded {} objects at version {}",
            self.query.request.entity,
            core.results.len(),
            core.version
        );
        Ok(())
    }

    pub fn number_of_sections(&self) -> usize {
        self.query.lock().results.number_of_sections()
    }

    pub fn number_of_objects(&self, section: usize) -> usize {
        self.query.lock().results.number_of_objects(section)
    }

    pub fn sections(&self) -> Vec<SectionInfo> {
        self.query.lock().results.sections()
    }

    pub fn object_at(&self, path: IndexPath) -> Result<Option<Managed<T>>> {
        let record = self.query.lock().results.object_at(path).cloned();
        record.map(|record| entity::decode(&record)).transpose()
    }

    pub fn index_path_of(&self, object: &Managed<T>) -> Option<IndexPath> {
        self.query.lock().results.index_path_of(object.id())
    }

    /// Every object in section order.
    pub fn fetched_objects(&self) -> Result<Vec<Managed<T>>> {
        let records: Vec<_> = self.query.lock().results.records().cloned().collect();
        records.iter().map(|record| entity::decode(record)).collect()
    }

    /// New stream of change batches, starting with the next commit.
    pub fn subscribe(&self) -> Result<ChangeStream> {
        let mut core = self.query.lock();
        if core.state == ControllerState::Disposed {
            return Err(PersistenceError::Store(StoreError::Disposed));
        }

        let (sender, stream) = ChangeStream::channel();
        core.subscribers.push(sender);
        Ok(stream)
    }

    /// Stops following the store and ends every subscription.
    ///
    /// Idempotent. Once it returns no further batch is delivered.
    pub fn dispose(&self) {
        let observer = {
            let mut core = self.query.lock();
            if core.state == ControllerState::Disposed {
                return;
            }
            core.state = ControllerState::Disposed;
            core.subscribers.clear();
            core.observer.take()
        };

        if let Some(id) = observer {
            self.store.store().unobserve(id);
        }
        debug!("Live query on '{}' disposed", self.query.request.entity);
    }
}

impl<T: Entity> Drop for FetchedResultsController<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Entity> std::fmt::Debug for FetchedResultsController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedResultsController")
            .field("entity", &self.query.request.entity)
            .field("section_key", &self.query.section_key)
            .field("state", &self.state())
            .finish()
    }
}
