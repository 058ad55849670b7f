//! `coach plan` subcommands.
//!
//! - `coach plan generate`        -- generate and store a general plan
//! - `coach plan from-weakness`   -- generate and store a plan for a weakness
//! - `coach plan show [plan-id]`  -- show one plan or list all plans

use anyhow::Result;
use chrono::NaiveDate;
use uuid::Uuid;

use coach_core::generator::TextGenerator;
use coach_core::plan::{
    DateRange, PlanRequest, PlanWithTasks, generate_plan, generate_plan_from_weakness,
    get_plan_with_tasks,
};
use coach_db::queries::plans as plan_queries;
use coach_db::{Gateway, Page};

use crate::PlanCommands;

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

pub async fn run_plan_command(
    command: PlanCommands,
    gateway: &Gateway,
    generator: &dyn TextGenerator,
) -> Result<()> {
    match command {
        PlanCommands::Generate {
            student,
            school,
            start,
            end,
            daily_minutes,
        } => {
            let request = build_request(student, school, start, end, daily_minutes)?;
            let stored = generate_plan(gateway, generator, &request).await?;
            println!("Plan created.");
            print_plan(&stored);
            Ok(())
        }
        PlanCommands::FromWeakness {
            weakness_id,
            student,
            school,
            start,
            end,
            daily_minutes,
        } => {
            let request = build_request(student.unwrap_or_default(), school, start, end, daily_minutes)?;
            let stored = generate_plan_from_weakness(gateway, generator, weakness_id, &request).await?;
            println!("Weakness plan created.");
            print_plan(&stored);
            Ok(())
        }
        PlanCommands::Show { plan_id } => match plan_id {
            Some(id) => cmd_show_one(gateway, id).await,
            None => cmd_show_all(gateway).await,
        },
    }
}

pub fn build_request(
    student_name: String,
    target_school: String,
    start: NaiveDate,
    end: NaiveDate,
    daily_duration: i32,
) -> Result<PlanRequest> {
    Ok(PlanRequest {
        student_name,
        target_school,
        range: DateRange::new(start, end)?,
        daily_duration,
    })
}

// -----------------------------------------------------------------------
// coach plan show
// -----------------------------------------------------------------------

async fn cmd_show_one(gateway: &Gateway, plan_id: Uuid) -> Result<()> {
    let stored = get_plan_with_tasks(gateway, plan_id).await?;
    print_plan(&stored);
    Ok(())
}

async fn cmd_show_all(gateway: &Gateway) -> Result<()> {
    let plans = plan_queries::list_plans(gateway, Page::default()).await?;
    if plans.is_empty() {
        println!("No plans found.");
        return Ok(());
    }
    println!("{:<36}  {:<10}  {:<10}  {:>4}  STUDENT", "ID", "STATUS", "START", "DAYS");
    for plan in &plans {
        println!(
            "{:<36}  {:<10}  {:<10}  {:>4}  {}",
            plan.id,
            plan.status.as_str(),
            plan.start_date.to_string(),
            plan.total_days,
            plan.student_name
        );
    }
    Ok(())
}

fn print_plan(stored: &PlanWithTasks) {
    let plan = &stored.plan;
    println!();
    println!("  Plan ID:   {}", plan.id);
    println!("  Student:   {}", plan.student_name);
    if !plan.target_school.is_empty() {
        println!("  School:    {}", plan.target_school);
    }
    println!(
        "  Period:    {} to {} ({} days, {} min/day)",
        plan.start_date, plan.end_date, plan.total_days, plan.daily_duration
    );
    println!("  Status:    {}", plan.status);
    println!();
    println!("  Allocation:");
    for (category, share) in plan.category_allocation.iter() {
        println!("    {category:<20} {share:>3}%");
    }
    if !plan.ai_suggestions.is_empty() {
        println!();
        println!("  Suggestions: {}", plan.ai_suggestions);
    }
    println!();
    println!("  Tasks:");
    for task in &stored.tasks {
        println!(
            "    {}  {:<20} {:>3} min  {}",
            task.task_date, task.category, task.duration, task.status
        );
    }
}
