//! SqliteTaskStore - TaskStore backed by an SQLite database through sqlx.
//!
//! Headers and the response summary are stored as JSON text. Status
//! changes are guarded in SQL, so a write that would move a task backwards
//! touches no row and is reported as an invalid transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, instrument};

use crate::domain::{RequestHeaders, ResponseSummary, TaskId, TaskRecord, TaskStatus};
use crate::ports::{StoreError, TaskStore};

const ALL_STATUSES: [TaskStatus; 4] = [
    TaskStatus::New,
    TaskStatus::InProcess,
    TaskStatus::Done,
    TaskStatus::Error,
];

const SELECT_COLUMNS: &str =
    "SELECT id, method, url, headers, status, response, created_at, updated_at FROM tasks";

pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Open (creating if needed) the database at `url` and make sure the
    /// schema exists.
    ///
    /// Every connection to an in-memory database is a database of its own,
    /// so for those the pool holds exactly one connection and never
    /// recycles it.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        debug!(url, "opening sqlite task store");
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool_options = if url.contains(":memory:") || url.contains("mode=memory") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5).min_connections(1)
        };
        let pool = pool_options.connect_with(options).await?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Private, empty in-memory database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                headers TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'new',
                response TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)")
            .execute(pool)
            .await?;
        Ok(())
    }

    fn row_to_task(row: &SqliteRow) -> Result<TaskRecord, StoreError> {
        let id = TaskId::new(row.try_get("id")?);
        let corrupt = |reason: String| StoreError::Corrupt { id, reason };

        let headers: String = row.try_get("headers")?;
        let headers: RequestHeaders =
            serde_json::from_str(&headers).map_err(|e| corrupt(format!("headers: {e}")))?;

        let status: String = row.try_get("status")?;
        let status = TaskStatus::from_str(&status).map_err(|e| corrupt(e.to_string()))?;

        let response: Option<String> = row.try_get("response")?;
        let response = response
            .map(|text| serde_json::from_str::<ResponseSummary>(&text))
            .transpose()
            .map_err(|e| corrupt(format!("response: {e}")))?;

        if response.is_some() != (status == TaskStatus::Done) {
            return Err(corrupt(format!("status {status} does not match response")));
        }

        Ok(TaskRecord {
            id,
            method: row.try_get("method")?,
            url: row.try_get("url")?,
            headers,
            status,
            response,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    /// Why a guarded update touched no row.
    async fn explain_missed_update(&self, id: TaskId, to: TaskStatus) -> StoreError {
        match self.get_task_by_id(id).await {
            Ok(current) => StoreError::InvalidTransition {
                id,
                from: current.status,
                to,
            },
            Err(err) => err,
        }
    }
}

fn in_list(statuses: &[TaskStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Statuses a task may currently hold for a write of `to` to be legal.
fn allowed_sources(to: TaskStatus) -> Vec<TaskStatus> {
    ALL_STATUSES
        .into_iter()
        .filter(|from| from.can_transition_to(to))
        .collect()
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    #[instrument(skip(self, task), fields(method = %task.method, url = %task.url))]
    async fn add_task(&self, task: &TaskRecord) -> Result<TaskId, StoreError> {
        let headers = serde_json::to_string(&task.headers)?;
        let response = task.response.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            "INSERT INTO tasks (method, url, headers, status, response, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&task.method)
        .bind(&task.url)
        .bind(headers)
        .bind(task.status.as_str())
        .bind(response)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;

        let id = TaskId::new(result.last_insert_rowid());
        debug!(task_id = %id, "task stored");
        Ok(id)
    }

    async fn get_all_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn get_task_by_id(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Self::row_to_task(&row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn delete_task_by_id(&self, id: TaskId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, to = %status))]
    async fn update_task_status(
        &self,
        task: &TaskRecord,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        if status == TaskStatus::Done {
            // Done is only written together with its response.
            return Err(self.explain_missed_update(task.id, status).await);
        }

        let sql = format!(
            "UPDATE tasks SET status = ?1, response = NULL, updated_at = ?2
             WHERE id = ?3 AND status IN ({})",
            in_list(&allowed_sources(status))
        );
        let result = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(task.id.get())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_update(task.id, status).await);
        }
        Ok(())
    }

    #[instrument(skip(self, task, response), fields(task_id = %task.id))]
    async fn update_task_response(
        &self,
        task: &TaskRecord,
        response: &ResponseSummary,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE tasks SET status = ?1, response = ?2, updated_at = ?3
             WHERE id = ?4 AND status IN ({})",
            in_list(&allowed_sources(TaskStatus::Done))
        );
        let result = sqlx::query(&sql)
            .bind(TaskStatus::Done.as_str())
            .bind(serde_json::to_string(response)?)
            .bind(Utc::now())
            .bind(task.id.get())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_update(task.id, TaskStatus::Done).await);
        }
        Ok(())
    }

    async fn clean_storage(&self) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM tasks").execute(&self.pool).await?;
        debug!(deleted = result.rows_affected(), "task storage cleaned");
        Ok(())
    }
}
