//! Query functions for the `student_weaknesses` table.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::gateway::{Gateway, Page, SqlParam};
use crate::models::{Severity, Weakness, WeaknessStatus};

/// Fields for a new weakness row.
#[derive(Debug, Clone)]
pub struct NewWeakness<'a> {
    pub student_name: Option<&'a str>,
    pub category: &'a str,
    pub weakness_type: &'a str,
    pub severity: Severity,
    pub description: &'a str,
    pub example_text: Option<&'a str>,
    pub improvement_suggestions: Option<&'a str>,
    pub related_topics: &'a [String],
}

/// Optional filters for [`list_weaknesses`]. `None` matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeaknessFilter<'a> {
    pub student_name: Option<&'a str>,
    pub category: Option<&'a str>,
    pub status: Option<WeaknessStatus>,
    pub severity: Option<Severity>,
}

/// Weakness counts grouped by category, severity and status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaknessSummary {
    pub total: i64,
    pub by_category: BTreeMap<String, i64>,
    pub by_severity: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
struct GroupCount {
    dimension: String,
    key: String,
    count: i64,
}

pub async fn insert_weakness(gateway: &Gateway, weakness: &NewWeakness<'_>) -> Result<Weakness> {
    gateway
        .insert(
            "INSERT INTO student_weaknesses \
             (student_name, category, weakness_type, severity, description, \
              example_text, improvement_suggestions, related_topics) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING *",
            &[
                weakness.student_name.into(),
                weakness.category.into(),
                weakness.weakness_type.into(),
                weakness.severity.as_str().into(),
                weakness.description.into(),
                weakness.example_text.into(),
                weakness.improvement_suggestions.into(),
                json!(weakness.related_topics).into(),
            ],
        )
        .await
}

pub async fn get_weakness(gateway: &Gateway, id: Uuid) -> Result<Option<Weakness>> {
    gateway
        .query_one(
            "SELECT * FROM student_weaknesses WHERE id = $1",
            &[id.into()],
            true,
        )
        .await
}

/// List weaknesses, newest first.
pub async fn list_weaknesses(
    gateway: &Gateway,
    filter: &WeaknessFilter<'_>,
    page: Page,
) -> Result<Vec<Weakness>> {
    gateway
        .query(
            "SELECT * FROM student_weaknesses \
             WHERE ($1::text IS NULL OR student_name = $1) \
             AND ($2::text IS NULL OR category = $2) \
             AND ($3::text IS NULL OR status = $3) \
             AND ($4::text IS NULL OR severity = $4) \
             ORDER BY created_at DESC, id \
             LIMIT $5 OFFSET $6",
            &[
                SqlParam::from(filter.student_name),
                SqlParam::from(filter.category),
                SqlParam::from(filter.status.map(WeaknessStatus::as_str)),
                SqlParam::from(filter.severity.map(Severity::as_str)),
                page.limit().into(),
                page.offset().into(),
            ],
            true,
        )
        .await
}

/// Set a weakness's status. Returns `None` when the id is unknown.
pub async fn update_weakness_status(
    gateway: &Gateway,
    id: Uuid,
    status: WeaknessStatus,
) -> Result<Option<Weakness>> {
    let rows: Vec<Weakness> = gateway
        .execute_returning(
            "UPDATE student_weaknesses SET status = $1 WHERE id = $2 RETURNING *",
            &[status.as_str().into(), id.into()],
        )
        .await?;
    Ok(rows.into_iter().next())
}

/// Count weaknesses, optionally for one student.
pub async fn weakness_summary(
    gateway: &Gateway,
    student_name: Option<&str>,
) -> Result<WeaknessSummary> {
    let rows: Vec<GroupCount> = gateway
        .query(
            "WITH w AS ( \
                 SELECT category, severity, status FROM student_weaknesses \
                 WHERE $1::text IS NULL OR student_name = $1 \
             ) \
             SELECT 'category' AS dimension, category AS key, COUNT(*) AS count FROM w GROUP BY category \
             UNION ALL \
             SELECT 'severity', severity, COUNT(*) FROM w GROUP BY severity \
             UNION ALL \
             SELECT 'status', status, COUNT(*) FROM w GROUP BY status",
            &[SqlParam::from(student_name)],
            true,
        )
        .await?;

    let mut summary = WeaknessSummary::default();
    for row in rows {
        let bucket = match row.dimension.as_str() {
            "category" => {
                summary.total += row.count;
                &mut summary.by_category
            }
            "severity" => &mut summary.by_severity,
            _ => &mut summary.by_status,
        };
        bucket.insert(row.key, row.count);
    }
    Ok(summary)
}
