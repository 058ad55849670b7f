//! Practice sessions: start, answer, complete.
//!
//! Answers carry a copy of the plan id taken at write time through
//! `session -> task -> plan`. Free-practice sessions have no task and their
//! answers have no plan.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use coach_db::Gateway;
use coach_db::gateway::is_unique_violation;
use coach_db::models::{
    DailyTask, Question, QaRecord, Session, SessionMode, SessionStatus, TaskStatus,
};
use coach_db::queries::qa_records::{self, NewQaRecord};
use coach_db::queries::{sessions, tasks};

use crate::error::{CoachError, CoachResult};
use crate::generator::TextGenerator;
use crate::questions::{QuestionRequest, ensure_available};

/// Input for [`start_session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSession {
    /// Task being practised; `None` for free practice.
    #[serde(default)]
    pub task_id: Option<Uuid>,
    /// Defaults to the task's category when a task is given, and must match
    /// it if set.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub mode: SessionMode,
    pub question_count: usize,
}

/// A freshly started session and the questions it will ask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedSession {
    pub session: Session,
    pub questions: Vec<Question>,
}

/// Input for [`record_answer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub session_id: Uuid,
    #[serde(default)]
    pub question_id: Option<Uuid>,
    pub question_text: String,
    pub answer_text: String,
    /// Seconds the student took to answer.
    #[serde(default)]
    pub response_time: Option<i32>,
}

/// The category a session practises: the task's when there is a task,
/// otherwise the requested one.
fn session_category(requested: Option<&str>, task: Option<&DailyTask>) -> CoachResult<String> {
    let requested = requested.map(str::trim).filter(|c| !c.is_empty());
    match (requested, task) {
        (Some(asked), Some(task)) if asked != task.category => Err(CoachError::InvalidInput(format!(
            "category {asked} does not match task {} category {}",
            task.id, task.category
        ))),
        (_, Some(task)) => Ok(task.category.clone()),
        (Some(asked), None) => Ok(asked.to_owned()),
        (None, None) => Err(CoachError::InvalidInput("free practice needs a category".into())),
    }
}

/// Start a practice session, drawing questions through the guarantor.
pub async fn start_session(
    gateway: &Gateway,
    generator: &dyn TextGenerator,
    request: &StartSession,
) -> CoachResult<StartedSession> {
    if request.question_count == 0 {
        return Err(CoachError::InvalidInput("question count must be positive".into()));
    }

    let task = match request.task_id {
        Some(id) => Some(
            tasks::get_task(gateway, id)
                .await?
                .ok_or_else(|| CoachError::not_found("task", id))?,
        ),
        None => None,
    };

    let category = session_category(request.category.as_deref(), task.as_ref())?;

    if let Some(task) = &task {
        if let Some(active) = sessions::active_session_for_task(gateway, task.id).await? {
            return Err(CoachError::Conflict(format!(
                "task {} already has active session {}",
                task.id, active.id
            )));
        }
    }

    let questions = ensure_available(
        gateway,
        generator,
        &QuestionRequest::new(category.clone(), request.question_count),
    )
    .await;
    if questions.is_empty() {
        return Err(CoachError::NoQuestionsAvailable(category));
    }
    let question_ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();

    let session = match sessions::insert_session(
        gateway,
        request.task_id,
        &category,
        request.mode,
        &question_ids,
    )
    .await
    {
        Ok(session) => session,
        Err(e) if is_unique_violation(&e) => {
            return Err(CoachError::Conflict(format!(
                "task {} already has an active session",
                request.task_id.unwrap_or_default()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(task) = &task {
        tasks::update_task_status(gateway, task.id, TaskStatus::InProgress).await?;
    }

    info!(
        session_id = %session.id,
        task_id = ?request.task_id,
        category = %category,
        questions = questions.len(),
        "session started"
    );
    Ok(StartedSession { session, questions })
}

/// Store one answer, deriving its plan id from the session's task.
pub async fn record_answer(gateway: &Gateway, answer: &Answer) -> CoachResult<QaRecord> {
    let session = sessions::get_session(gateway, answer.session_id)
        .await?
        .ok_or_else(|| CoachError::not_found("session", answer.session_id))?;
    if session.status == SessionStatus::Completed {
        return Err(CoachError::Conflict(format!(
            "session {} is already completed",
            session.id
        )));
    }
    if answer.question_text.trim().is_empty() {
        return Err(CoachError::InvalidInput("question text must not be empty".into()));
    }

    let plan_id = match session.task_id {
        Some(task_id) => match tasks::get_task(gateway, task_id).await? {
            Some(task) => Some(task.plan_id),
            None => {
                warn!(session_id = %session.id, %task_id, "session points at a missing task");
                None
            }
        },
        None => None,
    };

    let record = qa_records::insert_qa_record(
        gateway,
        &NewQaRecord {
            session_id: session.id,
            plan_id,
            question_id: answer.question_id,
            question_text: &answer.question_text,
            answer_text: &answer.answer_text,
            response_time: answer.response_time,
        },
    )
    .await?;
    Ok(record)
}

/// Mark a session completed and its task done. Completing an already
/// completed session returns it unchanged.
pub async fn complete_session(gateway: &Gateway, session_id: Uuid) -> CoachResult<Session> {
    let Some(session) = sessions::complete_session(gateway, session_id).await? else {
        return sessions::get_session(gateway, session_id)
            .await?
            .ok_or_else(|| CoachError::not_found("session", session_id));
    };

    if let Some(task_id) = session.task_id {
        if let Err(e) = tasks::update_task_status(gateway, task_id, TaskStatus::Completed).await {
            warn!(error = %format!("{e:#}"), %session_id, %task_id, "could not mark task completed");
        }
    }
    info!(%session_id, "session completed");
    Ok(session)
}

#[cfg(test)]
mod tests {
    use coach_db::decode::Lenient;

    use super::*;

    #[test]
    fn start_request_defaults() {
        let req: StartSession = serde_json::from_str(r#"{"question_count": 5}"#).unwrap();
        assert!(req.task_id.is_none());
        assert!(req.category.is_none());
        assert_eq!(req.mode, SessionMode::TextQa);
    }

    fn task(category: &str) -> DailyTask {
        DailyTask {
            id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            task_date: chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            category: category.into(),
            duration: 30,
            question_ids: Lenient(Vec::new()),
            status: TaskStatus::Pending,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn task_category_wins_and_must_match() {
        let oral = task("english-oral");
        assert_eq!(session_category(None, Some(&oral)).unwrap(), "english-oral");
        assert_eq!(session_category(Some("  "), Some(&oral)).unwrap(), "english-oral");
        assert_eq!(session_category(Some(" english-oral "), Some(&oral)).unwrap(), "english-oral");
        assert!(matches!(
            session_category(Some("logic-thinking"), Some(&oral)),
            Err(CoachError::InvalidInput(_))
        ));
        assert_eq!(session_category(Some("logic-thinking"), None).unwrap(), "logic-thinking");
        assert!(matches!(session_category(None, None), Err(CoachError::InvalidInput(_))));
    }

    #[test]
    fn answer_accepts_minimal_body() {
        let id = Uuid::new_v4();
        let body = serde_json::json!({
            "session_id": id,
            "question_text": "Why?",
            "answer_text": "Because."
        });
        let answer: Answer = serde_json::from_value(body).unwrap();
        assert_eq!(answer.session_id, id);
        assert!(answer.question_id.is_none());
        assert!(answer.response_time.is_none());
    }
}
