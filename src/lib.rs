// ============================================================================
// memopersist Library
// ============================================================================
//
// Storage-agnostic persistence layer: typed CRUD on bound contexts, scoped
// write transactions, background tasks and live, diffing result sets over
// a pluggable entity store.
//
// ============================================================================

//! # memopersist
//!
//! ```
//! use memopersist::{Entity, Predicate, SortDescriptor, StoreConfig, StoreHandle};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Student {
//!     name: String,
//!     course: String,
//!     score: i64,
//! }
//!
//! impl Entity for Student {
//!     const ENTITY_NAME: &'static str = "student";
//! }
//!
//! # fn main() -> memopersist::Result<()> {
//! let store = StoreHandle::open(StoreConfig::in_memory("school"))?;
//! let mut persistence = store.persistence()?;
//!
//! persistence.perform(|p| {
//!     let mut alice = p.insert::<Student>()?;
//!     alice.name = "Alice".into();
//!     alice.course = "Math".into();
//!     p.add_or_update(&alice)
//! })?;
//!
//! let math = persistence.fetch::<Student>(
//!     Predicate::parse("course = 'Math'")?,
//!     &[SortDescriptor::descending("score")],
//! )?;
//! assert_eq!(math[0].name, "Alice");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod entity;
pub mod executor;
pub mod expression;
pub mod facade;
pub mod observe;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use config::{StoreConfig, StoreLocation};
pub use core::{IndexPath, ObjectId, PersistenceError, Result, SortDescriptor, StoreError, Value};
pub use entity::{Document, Entity, EntitySchema, Managed, Record};
pub use expression::{CompareOp, Predicate};
pub use facade::{Persistence, StoreHandle};
pub use observe::{
    ChangeBatch, ChangeStream, ControllerState, FetchedResultsController, ObjectChange,
    SectionChange, SectionInfo,
};
pub use storage::{DurabilityMode, EntityStore, InMemoryStore, StoreSnapshot};
pub use transaction::ContextId;
