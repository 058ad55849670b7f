//! Practice session flow against a real database.

mod common;

use std::collections::BTreeMap;

use uuid::Uuid;

use coach_core::error::CoachError;
use coach_core::generator::UnavailableGenerator;
use coach_core::session::{Answer, StartSession, complete_session, record_answer, start_session};
use coach_db::Gateway;
use coach_db::models::{DailyTask, SessionMode, SessionStatus, TaskStatus};
use coach_db::queries::plans::{self, NewPlan};
use coach_db::queries::sessions;
use coach_db::queries::tasks::{self, NewTask};
use coach_test_utils::{TestDb, seed_questions};

use common::date;

async fn one_task_plan(gw: &Gateway, category: &str) -> DailyTask {
    let alloc = BTreeMap::from([(category.to_string(), 100)]);
    let mut tx = gw.begin().await.unwrap();
    let plan = plans::insert_plan(
        &mut tx,
        &NewPlan {
            student_name: "Ivy",
            target_school: "",
            start_date: date(1),
            end_date: date(1),
            total_days: 1,
            daily_duration: 20,
            category_allocation: &alloc,
            ai_suggestions: "",
        },
    )
    .await
    .unwrap();
    let task = tasks::insert_task(
        &mut tx,
        &NewTask {
            plan_id: plan.id,
            task_date: date(1),
            category,
            duration: 20,
            question_ids: &[],
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    gw.invalidate_tables(&["training_plans", "daily_tasks"]).await;
    task
}

fn start(task_id: Option<Uuid>, category: Option<&str>) -> StartSession {
    StartSession {
        task_id,
        category: category.map(str::to_owned),
        mode: SessionMode::TextQa,
        question_count: 3,
    }
}

#[tokio::test]
async fn task_session_round_trip() {
    let db = TestDb::new().await;
    let gw = &db.gateway;
    seed_questions(gw, "chinese-oral", 4).await;
    let task = one_task_plan(gw, "chinese-oral").await;

    let started = start_session(gw, &UnavailableGenerator, &start(Some(task.id), None))
        .await
        .unwrap();
    assert_eq!(started.session.category, "chinese-oral");
    assert_eq!(started.questions.len(), 3);
    assert_eq!(started.session.question_ids.as_ref().map(|ids| ids.len()), Some(3));
    let task_now = tasks::get_task(gw, task.id).await.unwrap().unwrap();
    assert_eq!(task_now.status, TaskStatus::InProgress);

    let q = &started.questions[0];
    let record = record_answer(
        gw,
        &Answer {
            session_id: started.session.id,
            question_id: Some(q.id),
            question_text: q.question_text.clone(),
            answer_text: "My answer".into(),
            response_time: Some(42),
        },
    )
    .await
    .unwrap();
    assert_eq!(record.plan_id, Some(task.plan_id));

    let done = complete_session(gw, started.session.id).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert!(done.ended_at.is_some());
    let again = complete_session(gw, started.session.id).await.unwrap();
    assert_eq!(again.ended_at, done.ended_at);
    let task_now = tasks::get_task(gw, task.id).await.unwrap().unwrap();
    assert_eq!(task_now.status, TaskStatus::Completed);

    db.teardown().await;
}

#[tokio::test]
async fn second_active_session_conflicts() {
    let db = TestDb::new().await;
    let gw = &db.gateway;
    seed_questions(gw, "english-oral", 3).await;
    let task = one_task_plan(gw, "english-oral").await;

    start_session(gw, &UnavailableGenerator, &start(Some(task.id), None))
        .await
        .unwrap();
    let err = start_session(gw, &UnavailableGenerator, &start(Some(task.id), None))
        .await
        .unwrap_err();
    assert!(matches!(err, CoachError::Conflict(_)));

    db.teardown().await;
}

#[tokio::test]
async fn task_session_rejects_a_different_category() {
    let db = TestDb::new().await;
    let gw = &db.gateway;
    seed_questions(gw, "english-oral", 3).await;
    seed_questions(gw, "logic-thinking", 3).await;
    let task = one_task_plan(gw, "english-oral").await;

    let err = start_session(gw, &UnavailableGenerator, &start(Some(task.id), Some("logic-thinking")))
        .await
        .unwrap_err();
    assert!(matches!(err, CoachError::InvalidInput(_)));
    assert!(sessions::active_session_for_task(gw, task.id).await.unwrap().is_none());

    let started = start_session(gw, &UnavailableGenerator, &start(Some(task.id), Some("english-oral")))
        .await
        .unwrap();
    assert_eq!(started.session.category, "english-oral");
    assert!(started.questions.iter().all(|q| q.category == "english-oral"));

    db.teardown().await;
}

#[tokio::test]
async fn free_practice_answers_have_no_plan() {
    let db = TestDb::new().await;
    let gw = &db.gateway;
    seed_questions(gw, "personal-growth", 2).await;

    let started = start_session(gw, &UnavailableGenerator, &start(None, Some("personal-growth")))
        .await
        .unwrap();
    assert!(started.session.task_id.is_none());
    assert_eq!(started.questions.len(), 2);

    let record = record_answer(
        gw,
        &Answer {
            session_id: started.session.id,
            question_id: None,
            question_text: "Tell me about a hobby.".into(),
            answer_text: "Chess.".into(),
            response_time: None,
        },
    )
    .await
    .unwrap();
    assert!(record.plan_id.is_none());

    db.teardown().await;
}

#[tokio::test]
async fn error_cases() {
    let db = TestDb::new().await;
    let gw = &db.gateway;

    let err = start_session(gw, &UnavailableGenerator, &start(Some(Uuid::new_v4()), None))
        .await
        .unwrap_err();
    assert!(matches!(err, CoachError::NotFound { entity: "task", .. }));

    let err = start_session(gw, &UnavailableGenerator, &start(None, Some("group-discussion")))
        .await
        .unwrap_err();
    assert!(matches!(err, CoachError::NoQuestionsAvailable(_)));

    let err = start_session(gw, &UnavailableGenerator, &start(None, None))
        .await
        .unwrap_err();
    assert!(matches!(err, CoachError::InvalidInput(_)));

    let err = record_answer(
        gw,
        &Answer {
            session_id: Uuid::new_v4(),
            question_id: None,
            question_text: "Q".into(),
            answer_text: "A".into(),
            response_time: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoachError::NotFound { entity: "session", .. }));

    let err = complete_session(gw, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, CoachError::NotFound { .. }));

    db.teardown().await;
}
