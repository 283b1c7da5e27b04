use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Single-key ordering rule.
///
/// The key is a dot-separated field path. Whether it names an existing field
/// is not checked here: unknown keys resolve to `NULL` for every entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortDescriptor {
    key: String,
    ascending: bool,
}

impl SortDescriptor {
    /// Ascending descriptor for `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: true,
        }
    }

    pub fn with_direction(key: impl Into<String>, ascending: bool) -> Self {
        Self {
            key: key.into(),
            ascending,
        }
    }

    pub fn ascending(key: impl Into<String>) -> Self {
        Self::with_direction(key, true)
    }

    pub fn descending(key: impl Into<String>) -> Self {
        Self::with_direction(key, false)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }

    /// Same key, opposite direction.
    pub fn reversed(&self) -> Self {
        Self::with_direction(self.key.clone(), !self.ascending)
    }
}

/// Identity of a stored entity, unique across all entity types of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an object inside a sectioned result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexPath {
    pub section: usize,
    pub row: usize,
}

impl IndexPath {
    pub fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.row)
    }
}
