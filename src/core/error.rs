use thiserror::Error;

/// Closed error taxonomy for every persistence operation.
///
/// The first four kinds carry fixed descriptions and no payload. Failures
/// raised by the underlying store travel through [`PersistenceError::Store`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Wrong entity type")]
    WrongEntityType,

    #[error("Persistence uninitialized")]
    UninitializedPersistence,

    #[error("Failed to init Persistence")]
    FailureToInit,

    #[error("Invalid section name key path")]
    InvalidSectionNameKeyPath,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Store-level failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Entity '{entity}' with id {id} not found")]
    EntityNotFound { entity: String, id: String },

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Results controller has been disposed")]
    Disposed,

    #[error("Background task ended without reporting a result")]
    TaskAborted,
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

impl PersistenceError {
    /// Configuration errors: the store behind an instance was never usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UninitializedPersistence | Self::FailureToInit)
    }
}

impl<T> From<std::sync::PoisonError<T>> for PersistenceError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Store(StoreError::Lock(err.to_string()))
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(StoreError::Serialization(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_descriptions() {
        assert_eq!(PersistenceError::WrongEntityType.to_string(), "Wrong entity type");
        assert_eq!(
            PersistenceError::UninitializedPersistence.to_string(),
            "Persistence uninitialized"
        );
        assert_eq!(PersistenceError::FailureToInit.to_string(), "Failed to init Persistence");
        assert_eq!(
            PersistenceError::InvalidSectionNameKeyPath.to_string(),
            "Invalid section name key path"
        );
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: PersistenceError = StoreError::Conflict("row gone".into()).into();
        assert_eq!(err.to_string(), "Write conflict: row gone");
        assert!(!err.is_fatal());
        assert!(PersistenceError::FailureToInit.is_fatal());
    }
}
