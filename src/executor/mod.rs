pub mod fetch;
pub mod sort;

pub use fetch::{FetchRequest, execute_fetch};
pub use sort::{RecordComparator, SortExecutor};
