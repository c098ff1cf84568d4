//! App - composes the ports into the relay.
//!
//! - **DispatchPipeline**: per-task lifecycle run by the workers
//! - **TaskOrchestrator**: admission, worker start-up, shutdown, queries

pub mod orchestrator;
pub mod pipeline;

pub use self::orchestrator::TaskOrchestrator;
pub use self::pipeline::DispatchPipeline;
