//! taskrelay-core
//!
//! Accepts outbound HTTP calls as tasks, keeps them in a store, and
//! dispatches them through a bounded queue drained by a fixed worker pool.
//!
//! # Modules
//! - **domain**: task records, lifecycle states, response summaries
//! - **ports**: TaskStore and DispatchClient
//! - **queue**: bounded buffer with backpressure plus the worker pool
//! - **app**: the dispatch pipeline and the orchestrator that wires it up
//! - **impls**: HTTP and SQLite implementations, in-memory doubles
//! - **config**, **observability**, **error**: runtime setup

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{DispatchPipeline, TaskOrchestrator};
pub use config::{ConfigError, RelayConfig};
pub use domain::{ResponseSummary, TaskId, TaskRecord, TaskSpec, TaskStatus};
pub use error::RelayError;
