pub mod durability;
pub mod engine;
pub mod memory;
pub mod table;

pub use durability::{DurabilityMode, SnapshotFile, SnapshotManager};
pub use engine::{
    CommitNotification, CommitReceipt, EntityChange, EntityStore, ObserverId, StoreObserver,
};
pub use memory::InMemoryStore;
pub use table::{EntityTable, StoreSnapshot};
