pub mod error;
pub mod types;
pub mod value;

pub use error::{PersistenceError, Result, StoreError};
pub use types::{IndexPath, ObjectId, SortDescriptor};
pub use value::Value;
