//! InMemoryTaskStore - TaskStore kept in a map, for development and tests.
//!
//! Besides the records it keeps the status history of every task, and it
//! can be told to fail selected writes so the pipeline's failure paths can
//! be exercised.
//!
//! ID は単調増加で、clean_storage 後も再利用しない。

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

use crate::domain::{ResponseSummary, TaskId, TaskRecord, TaskStatus};
use crate::ports::{StoreError, TaskStore};

#[derive(Default)]
struct InMemoryStoreState {
    /// Single source of truth for records.
    records: BTreeMap<TaskId, TaskRecord>,

    /// Every status each task was stored with, in write order.
    history: HashMap<TaskId, Vec<TaskStatus>>,

    /// Last id handed out. Never reset, so ids stay unique across cleans.
    last_id: i64,

    fail_adds: bool,
    failing_statuses: HashSet<TaskStatus>,
    fail_responses: bool,
}

impl InMemoryStoreState {
    fn record_mut(&mut self, id: TaskId) -> Result<&mut TaskRecord, StoreError> {
        self.records.get_mut(&id).ok_or(StoreError::NotFound(id))
    }

    fn check_transition(&self, id: TaskId, to: TaskStatus) -> Result<(), StoreError> {
        let from = self
            .records
            .get(&id)
            .map(|r| r.status)
            .ok_or(StoreError::NotFound(id))?;
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(StoreError::InvalidTransition { id, from, to })
        }
    }
}

pub struct InMemoryTaskStore {
    state: Mutex<InMemoryStoreState>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryStoreState::default()),
        }
    }

    /// Status history of a task (empty if unknown).
    pub async fn status_history(&self, id: TaskId) -> Vec<TaskStatus> {
        let state = self.state.lock().await;
        state.history.get(&id).cloned().unwrap_or_default()
    }

    /// Make `add_task` fail while set.
    pub async fn fail_adds(&self, fail: bool) {
        self.state.lock().await.fail_adds = fail;
    }

    /// Make writes of `status` fail while set.
    pub async fn fail_status_writes(&self, status: TaskStatus, fail: bool) {
        let mut state = self.state.lock().await;
        if fail {
            state.failing_statuses.insert(status);
        } else {
            state.failing_statuses.remove(&status);
        }
    }

    /// Make `update_task_response` fail while set.
    pub async fn fail_response_writes(&self, fail: bool) {
        self.state.lock().await.fail_responses = fail;
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn add_task(&self, task: &TaskRecord) -> Result<TaskId, StoreError> {
        let mut state = self.state.lock().await;
        if state.fail_adds {
            return Err(StoreError::Unavailable("injected add failure".into()));
        }

        state.last_id += 1;
        let id = TaskId::new(state.last_id);
        let record = task.clone().with_id(id);
        state.history.insert(id, vec![record.status]);
        state.records.insert(id, record);
        Ok(id)
    }

    async fn get_all_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.records.values().cloned().collect())
    }

    async fn get_task_by_id(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        let state = self.state.lock().await;
        state.records.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn delete_task_by_id(&self, id: TaskId) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        state.history.remove(&id);
        Ok(u64::from(state.records.remove(&id).is_some()))
    }

    async fn update_task_status(
        &self,
        task: &TaskRecord,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.failing_statuses.contains(&status) {
            return Err(StoreError::Unavailable(format!(
                "injected failure writing {status}"
            )));
        }
        if status == TaskStatus::Done {
            // Done only comes with a response, through update_task_response.
            let from = state.record_mut(task.id)?.status;
            return Err(StoreError::InvalidTransition {
                id: task.id,
                from,
                to: status,
            });
        }
        state.check_transition(task.id, status)?;

        state.record_mut(task.id)?.set_status(status);
        state.history.entry(task.id).or_default().push(status);
        Ok(())
    }

    async fn update_task_response(
        &self,
        task: &TaskRecord,
        response: &ResponseSummary,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.fail_responses {
            return Err(StoreError::Unavailable("injected response failure".into()));
        }
        state.check_transition(task.id, TaskStatus::Done)?;

        state.record_mut(task.id)?.mark_done(response.clone());
        state
            .history
            .entry(task.id)
            .or_default()
            .push(TaskStatus::Done);
        Ok(())
    }

    async fn clean_storage(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.records.clear();
        state.history.clear();
        Ok(())
    }
}
