//! `coach repair`.

use anyhow::Result;
use uuid::Uuid;

use coach_core::repair::{RepairScope, check_linkage, repair_linkage};
use coach_db::Gateway;

/// Map the mutually exclusive `--plan` / `--session` flags to a scope.
pub fn scope_from_flags(plan: Option<Uuid>, session: Option<Uuid>) -> RepairScope {
    match (plan, session) {
        (Some(id), _) => RepairScope::Plan(id),
        (None, Some(id)) => RepairScope::Session(id),
        (None, None) => RepairScope::All,
    }
}

pub async fn run_repair(gateway: &Gateway, scope: RepairScope, check_only: bool) -> Result<()> {
    let report = if check_only {
        let report = check_linkage(gateway, scope).await?;
        println!("Check ({scope}): nothing changed");
        report
    } else {
        let report = repair_linkage(gateway, scope).await?;
        println!("Repair ({scope}): {} rows changed", report.touched);
        report
    };
    for outcome in &report.passes {
        match outcome.touched {
            Some(n) => println!("  {:<30} {n}", outcome.pass.as_str()),
            None => println!("  {:<30} skipped", outcome.pass.as_str()),
        }
    }

    if report.is_clean() {
        println!("No inconsistencies remain.");
    } else {
        println!();
        println!(
            "{} records still inconsistent (showing {}):",
            report.remaining_count,
            report.remaining_issues.len()
        );
        for issue in &report.remaining_issues {
            let stored = issue.stored_plan_id.map_or("-".to_string(), |id| id.to_string());
            let expected = issue.expected_plan_id.map_or("-".to_string(), |id| id.to_string());
            println!(
                "  record {} session {}: plan {stored}, expected {expected}{}",
                issue.record_id,
                issue.session_id,
                if issue.session_exists { "" } else { " (session missing)" }
            );
        }
    }
    Ok(())
}
