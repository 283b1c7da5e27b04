use super::persistence::Persistence;
use crate::config::StoreConfig;
use crate::core::Result;
use crate::storage::{EntityStore, InMemoryStore, StoreSnapshot};
use std::fmt;
use std::sync::Arc;

/// Process-wide handle to one store.
///
/// Cheap to clone; every clone refers to the same store. Hand a clone to
/// each execution context and create a [`Persistence`] there.
///
/// # Examples
///
/// ```
/// use memopersist::{StoreConfig, StoreHandle};
///
/// # fn main() -> memopersist::Result<()> {
/// let store = StoreHandle::open(StoreConfig::in_memory("app"))?;
/// let mut persistence = store.persistence()?;
/// assert!(!persistence.has_changes());
///
/// store.close();
/// assert!(store.persistence().is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<dyn EntityStore>,
}

impl StoreHandle {
    /// Opens the reference store described by `config`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let store = InMemoryStore::open(&config)?;
        Ok(Self::from_store(Arc::new(store)))
    }

    /// Wraps any other `EntityStore` implementation.
    pub fn from_store(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// A new context bound to the calling thread.
    pub fn persistence(&self) -> Result<Persistence> {
        Persistence::new(self)
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    pub fn is_open(&self) -> bool {
        self.store.is_open()
    }

    /// Latest committed state.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        self.store.snapshot()
    }

    /// Closes the store for every handle and context.
    pub fn close(&self) {
        self.store.close();
    }

    pub(crate) fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("name", &self.name())
            .field("open", &self.is_open())
            .finish()
    }
}
