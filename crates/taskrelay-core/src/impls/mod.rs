//! Impls - implementations of the ports.
//!
//! # Production
//! - **HttpDispatchClient**: reqwest-backed DispatchClient
//! - **SqliteTaskStore**: sqlx/SQLite TaskStore
//!
//! # Development and tests
//! - **InMemoryTaskStore**: map-backed store with status history and
//!   injectable write failures
//! - **StubDispatchClient**: canned responses per URL

pub mod http_dispatch;
pub mod memory_store;
pub mod sqlite_store;
pub mod stub_dispatch;

pub use self::http_dispatch::HttpDispatchClient;
pub use self::memory_store::InMemoryTaskStore;
pub use self::sqlite_store::SqliteTaskStore;
pub use self::stub_dispatch::StubDispatchClient;
