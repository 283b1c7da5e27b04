// ============================================================================
// Transaction Support
// ============================================================================
//
// Contexts record writes as `Change`s (Command Pattern) against a private
// copy-on-write snapshot and hand them to the store as one unit.
// Savepoints let a failed `perform` block discard only its own writes.
//
// ============================================================================

pub mod change;
pub mod state;

pub use change::Change;
pub(crate) use state::Savepoint;
pub use state::ContextId;
