//! Plan service layer.
//!
//! Drafts a plan through the generator (degrading to a static plan when the
//! generator or its output fails) and stores the plan row and all task rows
//! inside a single database transaction.

use std::collections::BTreeSet;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use coach_db::Gateway;
use coach_db::models::Weakness;
use coach_db::queries::plans::{self as plan_queries, NewPlan};
use coach_db::queries::tasks::{self as task_queries, NewTask};
use coach_db::queries::weaknesses;

use super::allocation::{
    enforce_weakness, finalize_generated, required_weakness_days, standard_categories,
    template_draft, weakness_fallback_draft, WEAKNESS_MIN_SHARE,
};
use super::{DateRange, PlanDraft, PlanRequest, PlanWithTasks};
use crate::error::{CoachError, CoachResult};
use crate::generator::{ChatMessage, TextGenerator};
use crate::prompts::{self, PLAN_MAX_TOKENS, PLAN_TEMPERATURE};
use crate::response::{GeneratedPlan, parse_training_plan};

async fn request_plan(
    generator: &dyn TextGenerator,
    messages: &[ChatMessage],
) -> CoachResult<GeneratedPlan> {
    let raw = generator
        .complete(messages, PLAN_TEMPERATURE, PLAN_MAX_TOKENS)
        .await?;
    parse_training_plan(&raw)
}

/// Draft a general plan. Never fails: generator or validation failures, and
/// generated drafts that break the schedule invariants, fall back to the
/// template plan.
pub async fn draft_plan(generator: &dyn TextGenerator, request: &PlanRequest) -> PlanDraft {
    let messages = prompts::training_plan(request, &standard_categories());
    let generated = request_plan(generator, &messages).await.and_then(|plan| {
        let draft = finalize_generated(plan, &request.range, request.daily_duration);
        verify_draft(&draft, &request.range, None)?;
        Ok(draft)
    });
    match generated {
        Ok(draft) => draft,
        Err(e) => {
            warn!(error = %e, student = %request.student_name, "plan generation failed, using template");
            template_draft(&request.range, request.daily_duration)
        }
    }
}

/// Draft a plan targeting `weakness`. Never fails: total failure falls back
/// to the weakness template. Both weakness floors hold for every result.
pub async fn draft_plan_from_weakness(
    generator: &dyn TextGenerator,
    weakness: &Weakness,
    request: &PlanRequest,
) -> PlanDraft {
    let category = weakness.category.as_str();
    let messages = prompts::weakness_plan(request, weakness, &standard_categories());
    let generated = request_plan(generator, &messages).await.and_then(|plan| {
        let mut draft = finalize_generated(plan, &request.range, request.daily_duration);
        enforce_weakness(&mut draft, category, request.range.total_days());
        verify_draft(&draft, &request.range, Some(category))?;
        Ok(draft)
    });
    match generated {
        Ok(draft) => draft,
        Err(e) => {
            warn!(
                error = %e,
                weakness = %category,
                "weakness plan generation failed, using fallback"
            );
            weakness_fallback_draft(category, &request.range, request.daily_duration)
        }
    }
}

/// Check the numeric invariants a draft must meet before it is stored.
fn verify_draft(draft: &PlanDraft, range: &DateRange, weakness: Option<&str>) -> CoachResult<()> {
    let total: i32 = draft.category_allocation.values().sum();
    if total != 100 {
        return Err(CoachError::InvariantViolation(format!(
            "allocation sums to {total}, expected 100"
        )));
    }
    let covered: BTreeSet<NaiveDate> = draft.tasks.iter().map(|t| t.task_date).collect();
    if let Some(day) = range.days().find(|day| !covered.contains(day)) {
        return Err(CoachError::InvariantViolation(format!("no task scheduled on {day}")));
    }
    if let Some(weakness) = weakness {
        let share = draft.category_allocation.get(weakness).copied().unwrap_or(0);
        let days = draft.tasks.iter().filter(|t| t.category == weakness).count();
        let required = required_weakness_days(range.total_days());
        if share < WEAKNESS_MIN_SHARE || days < required {
            return Err(CoachError::InvariantViolation(format!(
                "weakness {weakness} has {share}% and {days} days, needs {WEAKNESS_MIN_SHARE}% and {required}"
            )));
        }
    }
    Ok(())
}

async fn save_draft(
    gateway: &Gateway,
    request: &PlanRequest,
    draft: &PlanDraft,
) -> CoachResult<PlanWithTasks> {
    let total_days = i32::try_from(request.range.total_days())
        .map_err(|_| CoachError::InvalidInput("date range is too long".into()))?;

    let mut tx = gateway.begin().await?;

    let plan = plan_queries::insert_plan(
        &mut tx,
        &NewPlan {
            student_name: &request.student_name,
            target_school: &request.target_school,
            start_date: request.range.start(),
            end_date: request.range.end(),
            total_days,
            daily_duration: request.daily_duration,
            category_allocation: &draft.category_allocation,
            ai_suggestions: &draft.ai_suggestions,
        },
    )
    .await?;

    let mut tasks = Vec::with_capacity(draft.tasks.len());
    for task in &draft.tasks {
        let row = task_queries::insert_task(
            &mut tx,
            &NewTask {
                plan_id: plan.id,
                task_date: task.task_date,
                category: &task.category,
                duration: task.duration,
                question_ids: &task.question_ids,
            },
        )
        .await?;
        tasks.push(row);
    }

    tx.commit().await.context("failed to commit plan")?;
    gateway
        .invalidate_tables(&["training_plans", "daily_tasks"])
        .await;

    info!(
        plan_id = %plan.id,
        tasks = tasks.len(),
        source = ?draft.source,
        "plan stored"
    );
    Ok(PlanWithTasks { plan, tasks })
}

/// Generate and store a general plan.
pub async fn generate_plan(
    gateway: &Gateway,
    generator: &dyn TextGenerator,
    request: &PlanRequest,
) -> CoachResult<PlanWithTasks> {
    request.validate()?;
    let draft = draft_plan(generator, request).await;
    verify_draft(&draft, &request.range, None)?;
    save_draft(gateway, request, &draft).await
}

/// Generate and store a plan targeting `weakness`.
///
/// An empty student name in `request` is taken from the weakness record.
pub async fn generate_from_weakness(
    gateway: &Gateway,
    generator: &dyn TextGenerator,
    weakness: &Weakness,
    request: &PlanRequest,
) -> CoachResult<PlanWithTasks> {
    let mut request = request.clone();
    if request.student_name.trim().is_empty() {
        request.student_name = weakness
            .student_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "student".to_owned());
    }
    request.validate()?;

    let draft = draft_plan_from_weakness(generator, weakness, &request).await;
    verify_draft(&draft, &request.range, Some(&weakness.category))?;
    save_draft(gateway, &request, &draft).await
}

/// Load a weakness by id and generate a plan for it.
pub async fn generate_plan_from_weakness(
    gateway: &Gateway,
    generator: &dyn TextGenerator,
    weakness_id: Uuid,
    request: &PlanRequest,
) -> CoachResult<PlanWithTasks> {
    let weakness = weaknesses::get_weakness(gateway, weakness_id)
        .await?
        .ok_or_else(|| CoachError::not_found("weakness", weakness_id))?;
    generate_from_weakness(gateway, generator, &weakness, request).await
}

/// Read a stored plan and its tasks.
pub async fn get_plan_with_tasks(gateway: &Gateway, plan_id: Uuid) -> CoachResult<PlanWithTasks> {
    let plan = plan_queries::get_plan(gateway, plan_id)
        .await?
        .ok_or_else(|| CoachError::not_found("plan", plan_id))?;
    let tasks = task_queries::list_tasks_for_plan(gateway, plan_id).await?;
    Ok(PlanWithTasks { plan, tasks })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use coach_db::decode::Lenient;
    use coach_db::models::{Severity, WeaknessStatus};

    use super::*;
    use crate::plan::DraftSource;
    use crate::testing::ScriptedGenerator;

    fn request(days: u32) -> PlanRequest {
        PlanRequest {
            student_name: "Fay".into(),
            target_school: "SPCC".into(),
            range: DateRange::new(
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, days).unwrap(),
            )
            .unwrap(),
            daily_duration: 30,
        }
    }

    fn weakness(category: &str) -> Weakness {
        Weakness {
            id: Uuid::new_v4(),
            student_name: Some("Fay".into()),
            category: category.into(),
            weakness_type: "logic".into(),
            severity: Severity::High,
            description: "Jumps to conclusions".into(),
            example_text: None,
            improvement_suggestions: None,
            related_topics: Lenient(vec![]),
            status: WeaknessStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn generator_failure_uses_template() {
        let generator = ScriptedGenerator::failing();
        let draft = draft_plan(&generator, &request(10)).await;
        assert_eq!(draft.source, DraftSource::Template);
        assert_eq!(draft.tasks.len(), 10);
        assert!(verify_draft(&draft, &request(10).range, None).is_ok());
    }

    #[tokio::test]
    async fn malformed_output_uses_template() {
        let generator = ScriptedGenerator::new(["{\"category_allocation\": {}}"]);
        let draft = draft_plan(&generator, &request(3)).await;
        assert_eq!(draft.source, DraftSource::Template);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn generated_plan_is_normalised() {
        let generator = ScriptedGenerator::new([r#"```json
        {"category_allocation": {"english-oral": 2, "chinese-oral": 1},
         "ai_suggestions": "Read aloud.",
         "daily_tasks": [{"task_date": "2025-03-02", "category": "chinese-oral", "duration": 25}]}
        ```"#]);
        let draft = draft_plan(&generator, &request(4)).await;
        assert_eq!(draft.source, DraftSource::Generated);
        assert_eq!(draft.category_allocation["english-oral"], 67);
        assert_eq!(draft.category_allocation["chinese-oral"], 33);
        assert_eq!(draft.tasks.len(), 4);
        assert_eq!(draft.tasks[1].duration, 25);
        assert_eq!(draft.ai_suggestions, "Read aloud.");
    }

    #[tokio::test]
    async fn huge_generated_shares_still_sum_to_100() {
        let generator = ScriptedGenerator::new([r#"{"category_allocation":
            {"english-oral": 1e308, "chinese-oral": 1e308},
            "daily_tasks": [{"task_date": "2025-03-01", "category": "english-oral", "duration": 30}]}"#]);
        let req = request(5);
        let draft = draft_plan(&generator, &req).await;
        assert_eq!(draft.source, DraftSource::Generated);
        assert_eq!(draft.category_allocation.values().sum::<i32>(), 100);
        assert!(verify_draft(&draft, &req.range, None).is_ok());
    }

    #[tokio::test]
    async fn weakness_floors_hold_for_generated_plan() {
        let tasks: Vec<String> = (1..=10)
            .map(|d| format!(r#"{{"task_date":"2025-03-{d:02}","category":"english-oral","duration":30}}"#))
            .collect();
        let raw = format!(
            r#"{{"category_allocation":{{"logic-thinking":10,"english-oral":50,"chinese-oral":40}},"daily_tasks":[{}]}}"#,
            tasks.join(",")
        );
        let generator = ScriptedGenerator::new([raw]);
        let req = request(10);
        let draft = draft_plan_from_weakness(&generator, &weakness("logic-thinking"), &req).await;

        assert_eq!(draft.category_allocation["logic-thinking"], 30);
        let weak_days = draft.tasks.iter().filter(|t| t.category == "logic-thinking").count();
        assert!(weak_days >= 4, "got {weak_days}");
        assert!(verify_draft(&draft, &req.range, Some("logic-thinking")).is_ok());
    }

    #[tokio::test]
    async fn weakness_total_failure_uses_fallback() {
        let generator = ScriptedGenerator::failing();
        let req = request(10);
        let draft = draft_plan_from_weakness(&generator, &weakness("science-knowledge"), &req).await;
        assert_eq!(draft.source, DraftSource::WeaknessFallback);
        assert_eq!(draft.category_allocation["science-knowledge"], 40);
        assert!(verify_draft(&draft, &req.range, Some("science-knowledge")).is_ok());
    }

    #[test]
    fn verify_rejects_broken_drafts() {
        let req = request(3);
        let mut draft = template_draft(&req.range, 30);
        draft.category_allocation.insert("extra".into(), 1);
        assert!(matches!(
            verify_draft(&draft, &req.range, None),
            Err(CoachError::InvariantViolation(_))
        ));

        let mut draft = template_draft(&req.range, 30);
        draft.tasks.pop();
        assert!(verify_draft(&draft, &req.range, None).is_err());

        let draft = template_draft(&req.range, 30);
        assert!(verify_draft(&draft, &req.range, Some("group-discussion")).is_err());
    }
}
