use std::sync::atomic::{AtomicU64, Ordering};

/// Global context ID counter
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one `Persistence` context, carried on every commit so
/// observers can tell where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub fn new() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx_{}", self.0)
    }
}

/// Marker a `perform` block can be rolled back to.
///
/// `generation` counts commits made by the context; a savepoint taken
/// before a commit can only discard what is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Savepoint {
    pub(crate) pending_len: usize,
    pub(crate) generation: u64,
}

impl Savepoint {
    /// Number of pending changes that survive a rollback to this savepoint.
    pub(crate) fn retained(&self, current_generation: u64) -> usize {
        if self.generation == current_generation {
            self.pending_len
        } else {
            0
        }
    }
}
