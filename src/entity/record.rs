use crate::core::{ObjectId, Value};
use serde::{Deserialize, Serialize};
use serde_json::Map;

pub type Document = Map<String, serde_json::Value>;

/// Stored form of one entity.
///
/// `sequence` is handed out by the store when the entity is first inserted
/// and never changes afterwards; ascending sequence is the store order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: ObjectId,
    entity: String,
    sequence: u64,
    document: Document,
}

impl Record {
    pub fn new(id: ObjectId, entity: impl Into<String>, sequence: u64, document: Document) -> Self {
        Self {
            id,
            entity: entity.into(),
            sequence,
            document,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Same identity, new field values.
    pub fn with_document(&self, document: Document) -> Self {
        Self {
            id: self.id,
            entity: self.entity.clone(),
            sequence: self.sequence,
            document,
        }
    }

    /// Scalar at `key_path`; `Null` when missing or not a scalar.
    pub fn value(&self, key_path: &str) -> Value {
        resolve_key_path(&self.document, key_path)
            .map(Value::from_json)
            .unwrap_or(Value::Null)
    }

    pub fn same_content(&self, other: &Record) -> bool {
        self.document == other.document
    }
}

/// Walks a dot-separated key path through nested JSON objects.
pub fn resolve_key_path<'a>(document: &'a Document, key_path: &str) -> Option<&'a serde_json::Value> {
    let mut parts = key_path.split('.');
    let first = parts.next().filter(|part| !part.is_empty())?;
    let mut current = document.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
