//! Query functions for the `qa_records` table.

use anyhow::Result;
use uuid::Uuid;

use crate::gateway::{Gateway, SqlParam};
use crate::models::QaRecord;

/// Fields for a new answer record.
#[derive(Debug, Clone)]
pub struct NewQaRecord<'a> {
    pub session_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub question_id: Option<Uuid>,
    pub question_text: &'a str,
    pub answer_text: &'a str,
    pub response_time: Option<i32>,
}

/// Insert an answer record.
pub async fn insert_qa_record(gateway: &Gateway, record: &NewQaRecord<'_>) -> Result<QaRecord> {
    gateway
        .insert(
            "INSERT INTO qa_records \
             (session_id, plan_id, question_id, question_text, answer_text, response_time) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING *",
            &[
                record.session_id.into(),
                record.plan_id.into(),
                record.question_id.into(),
                record.question_text.into(),
                record.answer_text.into(),
                SqlParam::Int(record.response_time.map(i64::from)),
            ],
        )
        .await
}

/// Records for a session in answer order.
pub async fn list_for_session(gateway: &Gateway, session_id: Uuid) -> Result<Vec<QaRecord>> {
    gateway
        .query(
            "SELECT * FROM qa_records WHERE session_id = $1 ORDER BY created_at, id",
            &[session_id.into()],
            true,
        )
        .await
}
