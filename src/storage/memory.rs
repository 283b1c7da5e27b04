use super::durability::{DurabilityMode, SnapshotFile, SnapshotManager};
use super::engine::{CommitNotification, CommitReceipt, EntityStore, ObserverId, StoreObserver};
use super::table::StoreSnapshot;
use crate::config::StoreConfig;
use crate::core::{PersistenceError, Result, StoreError};
use crate::entity::EntitySchema;
use crate::transaction::{Change, ContextId};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

struct Registration {
    entity: String,
    observer: Arc<dyn StoreObserver>,
}

/// Reference `EntityStore`: committed state kept in a copy-on-write
/// snapshot, optionally mirrored to a snapshot file.
pub struct InMemoryStore {
    name: String,
    /// Published committed state
    state: RwLock<StoreSnapshot>,
    /// Serializes commits and observer registration
    commit_lock: Mutex<()>,
    observers: RwLock<HashMap<ObserverId, Registration>>,
    next_sequence: AtomicU64,
    schemas: HashMap<String, EntitySchema>,
    durability: Option<SnapshotManager>,
    open: AtomicBool,
}

impl InMemoryStore {
    /// Empty memory-only store without schemas.
    pub fn new(name: &str) -> Self {
        Self::with_state(name, StoreSnapshot::new(), 1, HashMap::new(), None)
    }

    /// Opens a store described by `config`, restoring its snapshot file if
    /// one exists. Every failure is reported as `FailureToInit`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let schemas = config
            .schemas
            .iter()
            .map(|schema| (schema.name().to_string(), schema.clone()))
            .collect();

        let manager = config.snapshot_manager();
        let (snapshot, next_sequence) = match &manager {
            Some(manager) => Self::restore(manager)?,
            None => (StoreSnapshot::new(), 1),
        };

        let durability = manager.filter(|_| config.durability == DurabilityMode::OnCommit);
        if let Some(manager) = &durability {
            manager
                .save(&SnapshotFile::capture(&snapshot, next_sequence))
                .map_err(|e| {
                    warn!("Store '{}' is not writable: {}", config.name, e);
                    PersistenceError::FailureToInit
                })?;
        }

        info!(
            "Opened store '{}' ({} records, version {})",
            config.name,
            snapshot.record_count(),
            snapshot.version()
        );

        Ok(Self::with_state(
            &config.name,
            snapshot,
            next_sequence,
            schemas,
            durability,
        ))
    }

    fn with_state(
        name: &str,
        snapshot: StoreSnapshot,
        next_sequence: u64,
        schemas: HashMap<String, EntitySchema>,
        durability: Option<SnapshotManager>,
    ) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(snapshot),
            commit_lock: Mutex::new(()),
            observers: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(next_sequence),
            schemas,
            durability,
            open: AtomicBool::new(true),
        }
    }

    fn restore(manager: &SnapshotManager) -> Result<(StoreSnapshot, u64)> {
        match manager.load() {
            Ok(Some(file)) => Ok(file.into_snapshot()),
            Ok(None) => Ok((StoreSnapshot::new(), 1)),
            Err(e) => {
                warn!("Cannot restore {}: {}", manager.path().display(), e);
                Err(PersistenceError::FailureToInit)
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PersistenceError::UninitializedPersistence)
        }
    }

    fn current(&self) -> Result<StoreSnapshot> {
        Ok(self.state.read()?.clone())
    }

    /// Applies one change to the commit's scratch snapshot.
    fn apply_checked(snapshot: &mut StoreSnapshot, change: &Change) -> Result<()> {
        match change {
            Change::Insert { record } => {
                // Same id inserted elsewhere first: overwrite, keep its position.
                let record = match snapshot.get(record.entity(), record.id()) {
                    Some(existing) => Arc::new(existing.with_document(record.document().clone())),
                    None => Arc::clone(record),
                };
                snapshot.put(record);
            }
            Change::Update { new, .. } => {
                if snapshot.get(new.entity(), new.id()).is_none() {
                    return Err(StoreError::Conflict(format!(
                        "{} {} was deleted by another context",
                        new.entity(),
                        new.id()
                    ))
                    .into());
                }
                snapshot.put(Arc::clone(new));
            }
            Change::Delete { old } => {
                snapshot.remove(old.entity(), old.id());
            }
        }
        Ok(())
    }

    /// Writes, publishes and announces `after`. Caller holds the commit lock.
    fn publish(
        &self,
        before: &StoreSnapshot,
        after: StoreSnapshot,
        notification: CommitNotification,
    ) -> Result<CommitReceipt> {
        if let Some(manager) = &self.durability {
            let file = SnapshotFile::capture(&after, self.next_sequence.load(Ordering::SeqCst));
            manager.save(&file)?;
        }

        *self.state.write()? = after.clone();
        debug!(
            "Store '{}' committed version {} (was {}) from {}",
            self.name,
            after.version(),
            before.version(),
            notification.origin
        );

        self.notify(&notification);

        Ok(CommitReceipt {
            version: after.version(),
            snapshot: after,
        })
    }

    fn notify(&self, notification: &CommitNotification) {
        if notification.is_empty() {
            return;
        }

        let targets: Vec<Arc<dyn StoreObserver>> = match self.observers.read() {
            Ok(observers) => observers
                .values()
                .filter(|reg| notification.changes.contains_key(&reg.entity))
                .map(|reg| Arc::clone(&reg.observer))
                .collect(),
            Err(e) => {
                warn!("Observer registry poisoned: {}", e);
                return;
            }
        };

        for observer in targets {
            observer.store_did_commit(notification);
        }
    }
}

impl EntityStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> Result<StoreSnapshot> {
        self.ensure_open()?;
        self.current()
    }

    fn next_sequence(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.next_sequence.fetch_add(1, Ordering::SeqCst))
    }

    fn commit(&self, origin: ContextId, changes: &[Change]) -> Result<CommitReceipt> {
        self.ensure_open()?;
        let _guard = self.commit_lock.lock()?;
        self.ensure_open()?;

        let before = self.current()?;
        if changes.is_empty() {
            return Ok(CommitReceipt {
                version: before.version(),
                snapshot: before,
            });
        }

        let mut after = before.clone();
        for change in changes {
            if let Err(e) = Self::apply_checked(&mut after, change) {
                warn!("Commit from {} rejected: {}", origin, e);
                return Err(e);
            }
        }
        after.set_version(before.version() + 1);

        let touched = changes
            .iter()
            .map(|change| (change.entity().to_string(), change.id()));
        let notification = CommitNotification::between(origin, &before, &after, touched);
        self.publish(&before, after, notification)
    }

    fn clear(&self, origin: ContextId) -> Result<CommitReceipt> {
        self.ensure_open()?;
        let _guard = self.commit_lock.lock()?;
        self.ensure_open()?;

        let before = self.current()?;
        let mut after = StoreSnapshot::new();
        after.set_version(before.version() + 1);

        let touched: Vec<_> = before
            .all_records()
            .map(|record| (record.entity().to_string(), record.id()))
            .collect();
        let notification = CommitNotification::between(origin, &before, &after, touched);
        info!(
            "Store '{}' cleared {} records",
            self.name,
            before.record_count()
        );
        self.publish(&before, after, notification)
    }

    fn observe(&self, entity: &str, observer: Arc<dyn StoreObserver>) -> Result<ObserverId> {
        self.ensure_open()?;
        let _guard = self.commit_lock.lock()?;
        self.ensure_open()?;

        observer.attached(&self.current()?)?;

        let id = ObserverId::new();
        self.observers.write()?.insert(
            id,
            Registration {
                entity: entity.to_string(),
                observer,
            },
        );
        debug!("Observer {:?} attached to '{}'", id, entity);
        Ok(id)
    }

    fn unobserve(&self, id: ObserverId) {
        match self.observers.write() {
            Ok(mut observers) => {
                observers.remove(&id);
            }
            Err(e) => warn!("Observer registry poisoned: {}", e),
        }
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            if let Ok(mut observers) = self.observers.write() {
                observers.clear();
            }
            info!("Closed store '{}'", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn schema(&self, entity: &str) -> Option<EntitySchema> {
        self.schemas.get(entity).cloned()
    }
}
