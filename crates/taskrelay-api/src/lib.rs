//! HTTP front for the task relay.
//!
//! - `POST   /api/v1/tasks`       queue a task, 201 with its id
//! - `GET    /api/v1/tasks`       every stored task
//! - `DELETE /api/v1/tasks`       wipe the store
//! - `GET    /api/v1/tasks/{id}`  one task
//! - `DELETE /api/v1/tasks/{id}`  drop one task
//!
//! Handlers only translate HTTP to `TaskOrchestrator` calls.

pub mod error;
pub mod handlers;

use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use taskrelay_core::TaskOrchestrator;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub use error::{ApiError, ApiResult};

/// Shared state handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TaskOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<TaskOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/tasks",
            get(handlers::list_tasks)
                .post(handlers::create_task)
                .delete(handlers::clean_tasks),
        )
        .route(
            "/api/v1/tasks/{id}",
            get(handlers::get_task).delete(handlers::delete_task),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
