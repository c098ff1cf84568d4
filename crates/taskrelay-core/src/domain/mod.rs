//! Domain model (ids, task records, lifecycle, response summaries).

pub mod ids;
pub mod response;
pub mod state;
pub mod task;

pub use ids::TaskId;
pub use response::{HeaderMultiMap, ResponseSummary, UNKNOWN_CONTENT_LENGTH};
pub use state::{TaskStatus, UnknownStatus};
pub use task::{RequestHeaders, TaskRecord, TaskSpec};
