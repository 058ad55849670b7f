//! Query functions for the `daily_tasks` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgConnection;
use sqlx::types::Json;
use uuid::Uuid;

use crate::gateway::Gateway;
use crate::models::{DailyTask, TaskStatus};

/// Fields for a new daily task row.
#[derive(Debug, Clone)]
pub struct NewTask<'a> {
    pub plan_id: Uuid,
    pub task_date: NaiveDate,
    pub category: &'a str,
    pub duration: i32,
    pub question_ids: &'a [Uuid],
}

/// Insert a task on an open connection, typically inside the plan's
/// transaction. The caller must invalidate `daily_tasks` after commit.
pub async fn insert_task(conn: &mut PgConnection, task: &NewTask<'_>) -> Result<DailyTask> {
    let row = sqlx::query_as::<_, DailyTask>(
        "INSERT INTO daily_tasks (plan_id, task_date, category, duration, question_ids) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(task.plan_id)
    .bind(task.task_date)
    .bind(task.category)
    .bind(task.duration)
    .bind(Json(task.question_ids))
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("failed to insert task for {}", task.task_date))?;

    Ok(row)
}

/// Fetch a task by id.
pub async fn get_task(gateway: &Gateway, id: Uuid) -> Result<Option<DailyTask>> {
    gateway
        .query_one("SELECT * FROM daily_tasks WHERE id = $1", &[id.into()], true)
        .await
}

/// All tasks for a plan in date order.
pub async fn list_tasks_for_plan(gateway: &Gateway, plan_id: Uuid) -> Result<Vec<DailyTask>> {
    gateway
        .query(
            "SELECT * FROM daily_tasks WHERE plan_id = $1 ORDER BY task_date, created_at, id",
            &[plan_id.into()],
            true,
        )
        .await
}

/// Update the status of a task.
pub async fn update_task_status(gateway: &Gateway, id: Uuid, status: TaskStatus) -> Result<()> {
    let affected = gateway
        .execute(
            "UPDATE daily_tasks SET status = $1 WHERE id = $2",
            &[status.as_str().into(), id.into()],
        )
        .await?;

    if affected == 0 {
        anyhow::bail!("task {id} not found");
    }

    Ok(())
}
