//! Query functions for the `sessions` table.

use anyhow::Result;
use serde_json::json;
use uuid::Uuid;

use crate::gateway::Gateway;
use crate::models::{Session, SessionMode};

/// Insert an in-progress session.
///
/// Fails with a unique violation (see
/// [`is_unique_violation`](crate::gateway::is_unique_violation)) when the
/// task already has an in-progress session.
pub async fn insert_session(
    gateway: &Gateway,
    task_id: Option<Uuid>,
    category: &str,
    mode: SessionMode,
    question_ids: &[Uuid],
) -> Result<Session> {
    gateway
        .insert(
            "INSERT INTO sessions (task_id, category, mode, question_ids) \
             VALUES ($1, $2, $3, $4) \
             RETURNING *",
            &[
                task_id.into(),
                category.into(),
                mode.as_str().into(),
                json!(question_ids).into(),
            ],
        )
        .await
}

/// Fetch a session by id.
pub async fn get_session(gateway: &Gateway, id: Uuid) -> Result<Option<Session>> {
    gateway
        .query_one("SELECT * FROM sessions WHERE id = $1", &[id.into()], true)
        .await
}

/// The in-progress session for `task_id`, if one exists.
pub async fn active_session_for_task(gateway: &Gateway, task_id: Uuid) -> Result<Option<Session>> {
    gateway
        .query_one(
            "SELECT * FROM sessions WHERE task_id = $1 AND status = 'in_progress'",
            &[task_id.into()],
            false,
        )
        .await
}

/// Mark a session completed and stamp `ended_at`.
///
/// Returns `None` when the session does not exist or is already completed.
pub async fn complete_session(gateway: &Gateway, id: Uuid) -> Result<Option<Session>> {
    let rows: Vec<Session> = gateway
        .execute_returning(
            "UPDATE sessions SET status = 'completed', ended_at = now() \
             WHERE id = $1 AND status <> 'completed' \
             RETURNING *",
            &[id.into()],
        )
        .await?;
    Ok(rows.into_iter().next())
}
