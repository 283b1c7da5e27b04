use super::record::{Document, resolve_key_path};
use super::{Entity, encode};
use crate::core::Result;

/// Schema of an entity type known to a store by name.
///
/// Typed code never needs one; schemas back the dynamic record API, where
/// entity types are only known at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    name: String,
    default_document: Document,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>, default_document: Document) -> Self {
        Self {
            name: name.into(),
            default_document,
        }
    }

    /// Derives the schema from `T::default()`.
    pub fn of<T: Entity>() -> Result<Self> {
        Ok(Self::new(T::ENTITY_NAME, encode(&T::default())?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_document(&self) -> &Document {
        &self.default_document
    }

    /// True when `key_path` names a scalar (or null) field, i.e. a value
    /// that results can be grouped by.
    ///
    /// Only the default document is inspected. An `Option` field that
    /// defaults to `None` is accepted whatever it holds at runtime, and a
    /// path below it (`home.city` with `home: Option<Address>`) is rejected.
    pub fn is_groupable(&self, key_path: &str) -> bool {
        matches!(
            resolve_key_path(&self.default_document, key_path),
            Some(value) if !value.is_object() && !value.is_array()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Address {
        city: String,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Student {
        course: String,
        nickname: Option<String>,
        address: Address,
        tags: Vec<String>,
        home: Option<Address>,
    }

    impl Entity for Student {
        const ENTITY_NAME: &'static str = "student";
    }

    #[test]
    fn test_groupable_key_paths() {
        let schema = EntitySchema::of::<Student>().unwrap();

        assert_eq!(schema.name(), "student");
        assert!(schema.is_groupable("course"));
        assert!(schema.is_groupable("nickname"));
        assert!(schema.is_groupable("address.city"));
        assert!(!schema.is_groupable("address"));
        assert!(!schema.is_groupable("tags"));
        assert!(!schema.is_groupable("unknown"));
        assert!(!schema.is_groupable(""));
    }

    #[test]
    fn test_optional_struct_is_judged_by_its_default() {
        let schema = EntitySchema::of::<Student>().unwrap();

        assert!(schema.is_groupable("home"));
        assert!(!schema.is_groupable("home.city"));
    }
}
