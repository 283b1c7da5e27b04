// ============================================================================
// Live queries
// ============================================================================
//
// A `FetchedResultsController` registers with the store as a commit
// observer, keeps an ordered (optionally sectioned) copy of its result set
// and sends one `ChangeBatch` per relevant commit to its subscribers.
//
// ============================================================================

pub mod controller;
pub mod diff;
pub mod results;
pub mod stream;

pub use controller::{ControllerState, FetchedResultsController};
pub use diff::{ChangeBatch, ObjectChange, SectionChange};
pub use results::{ResultsSnapshot, SectionInfo};
pub use stream::ChangeStream;
