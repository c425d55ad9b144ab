/// SQLite persistence for session execution state
///
/// Persists exactly what must survive a process restart: position, status,
/// variables, step count, and the pending-wait descriptor with its timer
/// deadline. The funnel graph is referenced by ID only; transcripts are
/// in-memory observability and are not stored.

use crate::runtime::engine::{ExecutionState, SessionStatus};
use crate::runtime::executor::Waiting;
use crate::runtime::transcript::Transcript;
use crate::runtime::vars::VariableStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

/// SQLite-backed session state store
#[derive(Debug, Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the sessions schema; safe to call repeatedly
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                funnel_id TEXT NOT NULL,
                current_node_id TEXT,
                status TEXT NOT NULL,
                variables JSON NOT NULL,
                step_count INTEGER NOT NULL,
                waiting JSON,
                wake_at TEXT,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sessions_status
            ON sessions(status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert a session's persisted state after a tick
    pub async fn save_session(&self, state: &ExecutionState) -> Result<()> {
        let variables = serde_json::to_string(&state.variables)?;
        let waiting = state
            .waiting
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let wake_at = state.wake_at.map(|t| t.to_rfc3339());

        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, funnel_id, current_node_id, status, variables, step_count, waiting, wake_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                current_node_id = excluded.current_node_id,
                status = excluded.status,
                variables = excluded.variables,
                step_count = excluded.step_count,
                waiting = excluded.waiting,
                wake_at = excluded.wake_at,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(state.session_id.to_string())
        .bind(&state.funnel_id)
        .bind(&state.current_node_id)
        .bind(state.status.to_string())
        .bind(variables)
        .bind(state.step_count as i64)
        .bind(waiting)
        .bind(wake_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load one session's state, if persisted
    pub async fn get_session(&self, session_id: Uuid) -> Result<Option<ExecutionState>> {
        let row = sqlx::query(
            "SELECT id, funnel_id, current_node_id, status, variables, step_count, waiting, wake_at
             FROM sessions WHERE id = ?",
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_state).transpose()
    }

    /// Load all sessions that have not finished (startup restore)
    pub async fn load_unfinished_sessions(&self) -> Result<Vec<ExecutionState>> {
        let rows = sqlx::query(
            "SELECT id, funnel_id, current_node_id, status, variables, step_count, waiting, wake_at
             FROM sessions WHERE status != 'finished'",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_state).collect()
    }

    /// Delete a session row (archive/cancel)
    pub async fn delete_session(&self, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_state(row: sqlx::sqlite::SqliteRow) -> Result<ExecutionState> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let variables: String = row.get("variables");
    let waiting: Option<String> = row.get("waiting");
    let wake_at: Option<String> = row.get("wake_at");
    let step_count: i64 = row.get("step_count");

    let status = match status.as_str() {
        "running" => SessionStatus::Running,
        "waiting_for_input" => SessionStatus::WaitingForInput,
        _ => SessionStatus::Finished,
    };
    let variables: VariableStore = serde_json::from_str(&variables)?;
    let waiting: Option<Waiting> = waiting.as_deref().map(serde_json::from_str).transpose()?;
    let wake_at: Option<DateTime<Utc>> = wake_at
        .as_deref()
        .map(|t| DateTime::parse_from_rfc3339(t).map(|t| t.with_timezone(&Utc)))
        .transpose()?;

    Ok(ExecutionState {
        session_id: Uuid::parse_str(&id)?,
        funnel_id: row.get("funnel_id"),
        current_node_id: row.get("current_node_id"),
        status,
        variables,
        step_count: step_count as u64,
        waiting,
        wake_at,
        // Transcript is observability-only and starts empty after restore
        transcript: Transcript::new(),
    })
}
