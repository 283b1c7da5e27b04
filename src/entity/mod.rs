// ============================================================================
// Entities
// ============================================================================
//
// Typed application records and the JSON-document form the store keeps
// them in. Typed operations are bounded by `Entity`, so a type the store
// cannot name is rejected by the compiler rather than at runtime.
//
// ============================================================================

pub mod record;
pub mod schema;

pub use record::{Document, Record};
pub use schema::EntitySchema;

use crate::core::{ObjectId, PersistenceError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ops::{Deref, DerefMut};

/// A record type managed by a store.
///
/// The serde form of an entity must be a JSON object; field names of that
/// object are the keys predicates, sort descriptors and section key paths
/// refer to.
///
/// ```
/// use memopersist::Entity;
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
/// ```
pub trait Entity: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    /// Name of the collection this type is stored in.
    const ENTITY_NAME: &'static str;
}

/// An entity value together with its store identity.
///
/// Obtained from `insert`/`fetch`, or created detached with
/// [`Managed::new`] and handed to `add_or_update`.
#[derive(Debug, Clone, PartialEq)]
pub struct Managed<T> {
    id: ObjectId,
    value: T,
}

impl<T> Managed<T> {
    /// Wraps `value` under a fresh identity not yet known to any store.
    pub fn new(value: T) -> Self {
        Self {
            id: ObjectId::new(),
            value,
        }
    }

    pub fn with_id(id: ObjectId, value: T) -> Self {
        Self { id, value }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Managed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Managed<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// Serializes an entity into its document form.
pub(crate) fn encode<T: Entity>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(document) => Ok(document),
        _ => Err(PersistenceError::WrongEntityType),
    }
}

pub(crate) fn decode<T: Entity>(record: &Record) -> Result<Managed<T>> {
    if record.entity() != T::ENTITY_NAME {
        return Err(PersistenceError::WrongEntityType);
    }
    let value = serde_json::from_value(serde_json::Value::Object(record.document().clone()))?;
    Ok(Managed::with_id(record.id(), value))
}
