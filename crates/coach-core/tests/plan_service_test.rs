//! Plan generation against a real database.

mod common;

use uuid::Uuid;

use coach_core::error::CoachError;
use coach_core::generator::UnavailableGenerator;
use coach_core::plan::{generate_plan, generate_plan_from_weakness, get_plan_with_tasks};
use coach_db::models::{PlanStatus, Severity, TaskStatus};
use coach_db::queries::weaknesses::{self, NewWeakness};
use coach_test_utils::TestDb;

use common::{Replay, plan_request};

#[tokio::test]
async fn template_plan_is_stored_with_every_day() {
    let db = TestDb::new().await;
    let gw = &db.gateway;

    let stored = generate_plan(gw, &UnavailableGenerator, &plan_request("Ada", 1, 10))
        .await
        .unwrap();

    assert_eq!(stored.plan.status, PlanStatus::Active);
    assert_eq!(stored.plan.total_days, 10);
    assert_eq!(stored.plan.category_allocation.values().sum::<i32>(), 100);
    assert_eq!(stored.tasks.len(), 10);
    assert!(stored.tasks.iter().all(|t| t.status == TaskStatus::Pending));

    let loaded = get_plan_with_tasks(gw, stored.plan.id).await.unwrap();
    assert_eq!(loaded.plan.id, stored.plan.id);
    let dates: Vec<_> = loaded.tasks.iter().map(|t| t.task_date).collect();
    assert_eq!(dates.first(), Some(&common::date(1)));
    assert_eq!(dates.last(), Some(&common::date(10)));

    db.teardown().await;
}

#[tokio::test]
async fn generated_plan_is_padded_and_stored() {
    let db = TestDb::new().await;
    let gw = &db.gateway;
    let generator = Replay::new(&[r#"{
        "categoryAllocation": {"english-oral": 60, "current-affairs": 40},
        "aiSuggestions": "Watch the news daily.",
        "dailyTasks": [{"task_date": "2025-03-01", "category": "english-oral", "duration": 40}]
    }"#]);

    let stored = generate_plan(gw, &generator, &plan_request("Ben", 1, 3)).await.unwrap();

    assert_eq!(generator.calls(), 1);
    assert_eq!(stored.plan.ai_suggestions, "Watch the news daily.");
    assert_eq!(stored.plan.category_allocation["english-oral"], 60);
    assert_eq!(stored.tasks.len(), 3);
    assert_eq!(stored.tasks[0].duration, 40);
    assert!(stored.tasks[1..].iter().all(|t| t.duration == 30));

    db.teardown().await;
}

#[tokio::test]
async fn weakness_plan_honours_floors() {
    let db = TestDb::new().await;
    let gw = &db.gateway;
    let weakness = weaknesses::insert_weakness(
        gw,
        &NewWeakness {
            student_name: Some("Cai"),
            category: "logic-thinking",
            weakness_type: "reasoning",
            severity: Severity::High,
            description: "Skips steps",
            example_text: None,
            improvement_suggestions: None,
            related_topics: &[],
        },
    )
    .await
    .unwrap();

    let mut request = plan_request("", 1, 10);
    request.target_school.clear();
    let stored = generate_plan_from_weakness(gw, &UnavailableGenerator, weakness.id, &request)
        .await
        .unwrap();

    assert_eq!(stored.plan.student_name, "Cai");
    assert_eq!(stored.plan.category_allocation["logic-thinking"], 40);
    let weak_days = stored
        .tasks
        .iter()
        .filter(|t| t.category == "logic-thinking")
        .count();
    assert!(weak_days >= 4, "got {weak_days}");

    db.teardown().await;
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let db = TestDb::new().await;
    let gw = &db.gateway;

    let err = generate_plan_from_weakness(gw, &UnavailableGenerator, Uuid::new_v4(), &plan_request("Dan", 1, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, CoachError::NotFound { entity: "weakness", .. }));

    let err = get_plan_with_tasks(gw, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, CoachError::NotFound { entity: "plan", .. }));

    db.teardown().await;
}

#[tokio::test]
async fn invalid_request_stores_nothing() {
    let db = TestDb::new().await;
    let gw = &db.gateway;

    let mut request = plan_request("Eve", 1, 2);
    request.daily_duration = 0;
    let err = generate_plan(gw, &UnavailableGenerator, &request).await.unwrap_err();
    assert!(matches!(err, CoachError::InvalidInput(_)));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM training_plans")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);

    db.teardown().await;
}
