//! Query functions for the `questions` table.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;

use crate::gateway::{Gateway, Page, SqlParam, clamp_limit};
use crate::models::{Difficulty, Question, QuestionSource};

/// Fields for a new question row.
#[derive(Debug, Clone)]
pub struct NewQuestion<'a> {
    pub category: &'a str,
    pub difficulty: Difficulty,
    pub question_text: &'a str,
    pub reference_answer: &'a str,
    pub tags: &'a [String],
    pub school_code: Option<&'a str>,
    pub source: QuestionSource,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
struct CountRow {
    count: i64,
}

/// Insert a question. Returns the stored row.
pub async fn insert_question(gateway: &Gateway, question: &NewQuestion<'_>) -> Result<Question> {
    gateway
        .insert(
            "INSERT INTO questions \
             (category, difficulty, question_text, reference_answer, tags, school_code, source) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING *",
            &[
                question.category.into(),
                question.difficulty.as_str().into(),
                question.question_text.into(),
                question.reference_answer.into(),
                json!(question.tags).into(),
                question.school_code.into(),
                question.source.as_str().into(),
            ],
        )
        .await
}

/// Up to `limit` random questions from `category`. Never cached.
pub async fn sample_by_category(
    gateway: &Gateway,
    category: &str,
    limit: i64,
) -> Result<Vec<Question>> {
    gateway
        .query(
            "SELECT * FROM questions WHERE category = $1 ORDER BY random() LIMIT $2",
            &[category.into(), clamp_limit(limit).into()],
            false,
        )
        .await
}

/// Number of questions stored for `category`.
pub async fn count_by_category(gateway: &Gateway, category: &str) -> Result<i64> {
    let row: Option<CountRow> = gateway
        .query_one(
            "SELECT COUNT(*) AS count FROM questions WHERE category = $1",
            &[category.into()],
            false,
        )
        .await?;
    Ok(row.map_or(0, |r| r.count))
}

/// List questions, newest first, optionally filtered by category.
pub async fn list_questions(
    gateway: &Gateway,
    category: Option<&str>,
    page: Page,
) -> Result<Vec<Question>> {
    gateway
        .query(
            "SELECT * FROM questions \
             WHERE ($1::text IS NULL OR category = $1) \
             ORDER BY created_at DESC, id \
             LIMIT $2 OFFSET $3",
            &[
                SqlParam::from(category),
                page.limit().into(),
                page.offset().into(),
            ],
            true,
        )
        .await
}
