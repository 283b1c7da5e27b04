// ============================================================================
// Facade - the public entry points
// ============================================================================

pub mod handle;
pub mod persistence;
mod worker;

pub use handle::StoreHandle;
pub use persistence::Persistence;
