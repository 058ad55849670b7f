//! Query functions for the `training_plans` table.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgConnection;
use sqlx::types::Json;
use uuid::Uuid;

use crate::gateway::{Gateway, Page};
use crate::models::{Plan, PlanStatus};

/// Fields for a new plan row.
#[derive(Debug, Clone)]
pub struct NewPlan<'a> {
    pub student_name: &'a str,
    pub target_school: &'a str,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: i32,
    pub daily_duration: i32,
    pub category_allocation: &'a BTreeMap<String, i32>,
    pub ai_suggestions: &'a str,
}

/// Insert a plan on an open connection, typically inside a transaction.
///
/// The caller must invalidate `training_plans` after commit.
pub async fn insert_plan(conn: &mut PgConnection, plan: &NewPlan<'_>) -> Result<Plan> {
    let row = sqlx::query_as::<_, Plan>(
        "INSERT INTO training_plans \
         (student_name, target_school, start_date, end_date, total_days, \
          daily_duration, category_allocation, ai_suggestions) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(plan.student_name)
    .bind(plan.target_school)
    .bind(plan.start_date)
    .bind(plan.end_date)
    .bind(plan.total_days)
    .bind(plan.daily_duration)
    .bind(Json(plan.category_allocation))
    .bind(plan.ai_suggestions)
    .fetch_one(&mut *conn)
    .await
    .context("failed to insert training plan")?;

    Ok(row)
}

/// Fetch a plan by id.
pub async fn get_plan(gateway: &Gateway, id: Uuid) -> Result<Option<Plan>> {
    gateway
        .query_one("SELECT * FROM training_plans WHERE id = $1", &[id.into()], true)
        .await
}

/// List plans, newest first.
pub async fn list_plans(gateway: &Gateway, page: Page) -> Result<Vec<Plan>> {
    gateway
        .query(
            "SELECT * FROM training_plans ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
            &[page.limit().into(), page.offset().into()],
            true,
        )
        .await
}

/// Update the status of a plan.
pub async fn update_plan_status(gateway: &Gateway, id: Uuid, status: PlanStatus) -> Result<()> {
    let affected = gateway
        .execute(
            "UPDATE training_plans SET status = $1 WHERE id = $2",
            &[status.as_str().into(), id.into()],
        )
        .await?;

    if affected == 0 {
        anyhow::bail!("plan {id} not found");
    }

    Ok(())
}
