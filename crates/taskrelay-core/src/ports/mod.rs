//! Ports - the collaborators the dispatch core depends on.
//!
//! - **TaskStore**: persistence of task records (SQL in production).
//! - **DispatchClient**: the outbound HTTP call.
//!
//! Each port has one production implementation and one in-memory double
//! in `impls`.

pub mod dispatch;
pub mod task_store;

pub use self::dispatch::{DEFAULT_DISPATCH_TIMEOUT, DispatchClient, DispatchError};
pub use self::task_store::{StoreError, TaskStore};
