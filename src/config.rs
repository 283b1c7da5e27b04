use crate::core::{PersistenceError, Result};
use crate::entity::{Entity, EntitySchema};
use crate::storage::{DurabilityMode, SnapshotManager};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Where a store keeps its committed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Process memory only; gone when the last handle closes.
    Memory,
    /// Snapshot file `<dir>/<name>.snapshot`.
    Directory(PathBuf),
}

/// Store configuration
///
/// Built with the `in_memory` / `file` constructors and refined with the
/// builder methods; checked by `StoreHandle::open`.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store name; also the snapshot file stem
    pub name: String,

    pub location: StoreLocation,

    /// When committed state is written to disk
    pub durability: DurabilityMode,

    /// Schemas available to the dynamic record API
    pub schemas: Vec<EntitySchema>,

    /// Entity types whose default value is not a document
    rejected: Vec<String>,
}

impl StoreConfig {
    /// Create a configuration for a memory-only store
    pub fn in_memory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            location: StoreLocation::Memory,
            durability: DurabilityMode::None,
            schemas: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Create a configuration for a store persisted under `dir`
    pub fn file(name: &str, dir: impl AsRef<Path>) -> Self {
        Self {
            name: name.to_string(),
            location: StoreLocation::Directory(dir.as_ref().to_path_buf()),
            durability: DurabilityMode::OnCommit,
            schemas: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Register the schema of entity type `T`
    pub fn register<T: Entity>(mut self) -> Self {
        match EntitySchema::of::<T>() {
            Ok(schema) => self.schemas.push(schema),
            Err(_) => self.rejected.push(T::ENTITY_NAME.to_string()),
        }
        self
    }

    /// Register a schema built at runtime
    pub fn register_schema(mut self, schema: EntitySchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Set durability mode
    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    /// Parse from a store URL
    ///
    /// Format: `memory://name` or `file:///path/to/dir/name`
    ///
    /// # Examples
    ///
    /// ```
    /// use memopersist::{StoreConfig, StoreLocation};
    ///
    /// let config = StoreConfig::from_url("file:///var/lib/app/school").unwrap();
    /// assert_eq!(config.name, "school");
    /// assert_eq!(config.location, StoreLocation::Directory("/var/lib/app".into()));
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        if let Some(name) = url.strip_prefix("memory://") {
            return Ok(Self::in_memory(name));
        }

        let path = url
            .strip_prefix("file://")
            .map(Path::new)
            .ok_or(PersistenceError::FailureToInit)?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or(PersistenceError::FailureToInit)?;
        let dir = path.parent().ok_or(PersistenceError::FailureToInit)?;
        Ok(Self::file(name, dir))
    }

    /// Check the configuration before a store is opened.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            log::warn!("Invalid store name {:?}", self.name);
            return Err(PersistenceError::FailureToInit);
        }

        if let Some(entity) = self.rejected.first() {
            log::warn!("Entity type '{}' does not serialize to a document", entity);
            return Err(PersistenceError::FailureToInit);
        }

        let mut names = HashSet::new();
        for schema in &self.schemas {
            if !is_valid_name(schema.name()) || !names.insert(schema.name()) {
                log::warn!("Duplicate or invalid schema '{}'", schema.name());
                return Err(PersistenceError::FailureToInit);
            }
        }

        Ok(())
    }

    /// Snapshot file manager for on-disk stores.
    pub fn snapshot_manager(&self) -> Option<SnapshotManager> {
        match &self.location {
            StoreLocation::Memory => None,
            StoreLocation::Directory(dir) => Some(SnapshotManager::new(dir, &self.name)),
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Document;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Course {
        title: String,
    }

    impl Entity for Course {
        const ENTITY_NAME: &'static str = "course";
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Score(u32);

    impl Entity for Score {
        const ENTITY_NAME: &'static str = "score";
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::file("school", "/tmp/school")
            .register::<Course>()
            .durability(DurabilityMode::None);

        assert_eq!(config.name, "school");
        assert_eq!(config.durability, DurabilityMode::None);
        assert_eq!(config.schemas.len(), 1);
        assert!(config.validate().is_ok());
        assert!(config.snapshot_manager().is_some());
        assert!(StoreConfig::in_memory("school").snapshot_manager().is_none());
    }

    #[test]
    fn test_invalid_configurations() {
        assert!(StoreConfig::in_memory("").validate().is_err());
        assert!(StoreConfig::in_memory("../escape").validate().is_err());
        assert!(StoreConfig::in_memory("s").register::<Score>().validate().is_err());

        let duplicate = StoreConfig::in_memory("s")
            .register::<Course>()
            .register_schema(EntitySchema::new("course", Document::new()));
        assert_eq!(duplicate.validate(), Err(PersistenceError::FailureToInit));
    }

    #[test]
    fn test_from_url() {
        let memory = StoreConfig::from_url("memory://cache").unwrap();
        assert_eq!(memory.location, StoreLocation::Memory);
        assert_eq!(memory.name, "cache");

        assert!(StoreConfig::from_url("postgres://db").is_err());
    }
}
