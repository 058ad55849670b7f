//! Consistency repair for denormalized practice links.
//!
//! `qa_records.plan_id` is a copy of `sessions.task_id -> daily_tasks.plan_id`
//! taken at write time, and neither `sessions.task_id` nor
//! `qa_records.session_id` carries a foreign key. The passes here bring the
//! stored links back in line with the derivation. Every pass is a single
//! idempotent statement; running the whole sequence twice in a row touches
//! nothing the second time.
//!
//! Pass order matters: orphans and dangling references are cleared first so
//! the later passes see the final shape of the session/task graph.

mod report;

pub use report::{MAX_REMAINING_SAMPLE, PassOutcome, RemainingIssue, RepairPass, RepairReport};

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{info, warn};
use uuid::Uuid;

use coach_db::{Gateway, SqlParam};

use crate::error::{CoachError, CoachResult};

/// Which rows a repair run may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RepairScope {
    All,
    Plan(Uuid),
    Session(Uuid),
}

impl fmt::Display for RepairScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairScope::All => f.write_str("all"),
            RepairScope::Plan(id) => write!(f, "plan {id}"),
            RepairScope::Session(id) => write!(f, "session {id}"),
        }
    }
}

impl RepairScope {
    fn params(&self) -> Vec<SqlParam> {
        match self {
            RepairScope::All => Vec::new(),
            RepairScope::Plan(id) | RepairScope::Session(id) => vec![(*id).into()],
        }
    }

    /// Predicate over a `qa_records` row aliased `r`.
    fn records(&self) -> &'static str {
        match self {
            RepairScope::All => "TRUE",
            RepairScope::Plan(_) => {
                "(r.plan_id = $1 OR r.session_id IN (\
                 SELECT ps.id FROM sessions ps JOIN daily_tasks pt ON pt.id = ps.task_id \
                 WHERE pt.plan_id = $1))"
            }
            RepairScope::Session(_) => "r.session_id = $1",
        }
    }

    /// Predicate over a `sessions` row aliased `s`.
    fn sessions(&self) -> &'static str {
        match self {
            RepairScope::All => "TRUE",
            RepairScope::Plan(_) => {
                "(s.task_id IN (SELECT pt.id FROM daily_tasks pt WHERE pt.plan_id = $1) \
                 OR s.id IN (SELECT pr.session_id FROM qa_records pr WHERE pr.plan_id = $1))"
            }
            RepairScope::Session(_) => "s.id = $1",
        }
    }

    /// Predicate over a `daily_tasks` row aliased `t`. `None` when tasks are
    /// out of scope.
    fn tasks(&self) -> Option<&'static str> {
        match self {
            RepairScope::All => Some("TRUE"),
            RepairScope::Plan(_) => Some("t.plan_id = $1"),
            RepairScope::Session(_) => None,
        }
    }
}

fn pass_sql(pass: RepairPass, scope: &RepairScope) -> Option<String> {
    let sql = match pass {
        RepairPass::PruneOrphanRecords => format!(
            "DELETE FROM qa_records r \
             WHERE NOT EXISTS (SELECT 1 FROM sessions s WHERE s.id = r.session_id) \
             AND {}",
            scope.records()
        ),
        RepairPass::ClearDanglingTaskRefs => format!(
            "UPDATE sessions s SET task_id = NULL \
             WHERE s.task_id IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM daily_tasks t WHERE t.id = s.task_id) \
             AND {}",
            scope.sessions()
        ),
        RepairPass::BackfillSessionQuestions => format!(
            "UPDATE sessions s SET question_ids = agg.ids \
             FROM ( \
                 SELECT q.session_id, \
                        COALESCE(jsonb_agg(q.question_id ORDER BY q.first_at, q.question_id) \
                                 FILTER (WHERE q.question_id IS NOT NULL), '[]'::jsonb) AS ids \
                 FROM ( \
                     SELECT session_id, question_id, MIN(created_at) AS first_at \
                     FROM qa_records GROUP BY session_id, question_id \
                 ) q \
                 GROUP BY q.session_id \
             ) agg \
             WHERE s.id = agg.session_id AND s.question_ids IS NULL \
             AND {}",
            scope.sessions()
        ),
        RepairPass::DeleteEmptySessions => format!(
            "DELETE FROM sessions s \
             WHERE s.question_ids IS NULL \
             AND NOT EXISTS (SELECT 1 FROM qa_records r WHERE r.session_id = s.id) \
             AND {}",
            scope.sessions()
        ),
        RepairPass::ResetStrandedTasks => format!(
            "UPDATE daily_tasks t SET status = 'pending' \
             WHERE t.status = 'in_progress' \
             AND NOT EXISTS (SELECT 1 FROM sessions s WHERE s.task_id = t.id) \
             AND {}",
            scope.tasks()?
        ),
        RepairPass::ForwardFillPlanIds => format!(
            "UPDATE qa_records r SET plan_id = t.plan_id \
             FROM sessions s JOIN daily_tasks t ON t.id = s.task_id \
             WHERE r.session_id = s.id \
             AND r.plan_id IS DISTINCT FROM t.plan_id \
             AND {}",
            scope.records()
        ),
        RepairPass::ClearFreePracticePlanIds => format!(
            "UPDATE qa_records r SET plan_id = NULL \
             FROM sessions s \
             WHERE r.session_id = s.id AND s.task_id IS NULL AND r.plan_id IS NOT NULL \
             AND {}",
            scope.records()
        ),
    };
    Some(sql)
}

const VIOLATIONS_FROM: &str = "FROM qa_records r \
     LEFT JOIN sessions s ON s.id = r.session_id \
     LEFT JOIN daily_tasks t ON t.id = s.task_id \
     WHERE (s.id IS NULL OR r.plan_id IS DISTINCT FROM t.plan_id)";

#[derive(Debug, Serialize, Deserialize, FromRow)]
struct CountRow {
    count: i64,
}

async fn remaining(gateway: &Gateway, scope: &RepairScope) -> CoachResult<(i64, Vec<RemainingIssue>)> {
    let params = scope.params();
    let count: Option<CountRow> = gateway
        .query_one(
            &format!("SELECT COUNT(*) AS count {VIOLATIONS_FROM} AND {}", scope.records()),
            &params,
            false,
        )
        .await?;
    let sample: Vec<RemainingIssue> = gateway
        .query(
            &format!(
                "SELECT r.id AS record_id, r.session_id, r.plan_id AS stored_plan_id, \
                        t.plan_id AS expected_plan_id, (s.id IS NOT NULL) AS session_exists \
                 {VIOLATIONS_FROM} AND {} \
                 ORDER BY r.created_at, r.id \
                 LIMIT {MAX_REMAINING_SAMPLE}",
                scope.records()
            ),
            &params,
            false,
        )
        .await?;
    Ok((count.map_or(0, |c| c.count), sample))
}

/// Report drift within `scope` without changing anything.
///
/// The report lists no passes and zero touched rows.
pub async fn check_linkage(gateway: &Gateway, scope: RepairScope) -> CoachResult<RepairReport> {
    let (remaining_count, remaining_issues) = remaining(gateway, &scope).await?;
    info!(scope = %scope, remaining = remaining_count, "linkage checked");
    Ok(RepairReport::new(scope, Vec::new(), remaining_count, remaining_issues))
}

/// Run every repair pass within `scope` and report what changed and what
/// is still inconsistent.
///
/// Remaining drift is logged, never returned as an error. Database failures
/// abort the run.
pub async fn repair_linkage(gateway: &Gateway, scope: RepairScope) -> CoachResult<RepairReport> {
    let params = scope.params();
    let mut passes = Vec::with_capacity(RepairPass::ALL.len());

    for pass in RepairPass::ALL {
        let touched = match pass_sql(pass, &scope) {
            Some(sql) => {
                let n = gateway.execute(&sql, &params).await?;
                if n > 0 {
                    info!(pass = %pass, touched = n, scope = %scope, "repair pass changed rows");
                }
                Some(n)
            }
            None => None,
        };
        passes.push(PassOutcome { pass, touched });
    }

    let (remaining_count, remaining_issues) = remaining(gateway, &scope).await?;
    let report = RepairReport::new(scope, passes, remaining_count, remaining_issues);

    if report.remaining_count > 0 {
        let err = CoachError::InvariantViolation(format!(
            "{} qa_records still disagree with their session's plan",
            report.remaining_count
        ));
        warn!(error = %err, scope = %scope, "repair left unresolved drift");
    }
    info!(scope = %scope, touched = report.touched, "repair finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders(sql: &str) -> bool {
        sql.contains("$1")
    }

    #[test]
    fn all_scope_binds_nothing() {
        assert!(RepairScope::All.params().is_empty());
        for pass in RepairPass::ALL {
            let sql = pass_sql(pass, &RepairScope::All).unwrap();
            assert!(!placeholders(&sql), "{pass} uses a placeholder");
        }
    }

    #[test]
    fn scoped_passes_bind_the_id() {
        let id = Uuid::new_v4();
        for scope in [RepairScope::Plan(id), RepairScope::Session(id)] {
            assert_eq!(scope.params().len(), 1);
            for pass in RepairPass::ALL {
                if let Some(sql) = pass_sql(pass, &scope) {
                    assert!(placeholders(&sql), "{pass} ignores {scope}");
                }
            }
        }
    }

    #[test]
    fn session_scope_leaves_tasks_alone() {
        let scope = RepairScope::Session(Uuid::new_v4());
        assert!(pass_sql(RepairPass::ResetStrandedTasks, &scope).is_none());
        assert!(pass_sql(RepairPass::ResetStrandedTasks, &RepairScope::Plan(Uuid::new_v4())).is_some());
    }

    #[test]
    fn pass_statements_target_one_table() {
        use coach_db::gateway::referenced_table;
        let expect = [
            (RepairPass::PruneOrphanRecords, "qa_records"),
            (RepairPass::ClearDanglingTaskRefs, "sessions"),
            (RepairPass::BackfillSessionQuestions, "sessions"),
            (RepairPass::DeleteEmptySessions, "sessions"),
            (RepairPass::ResetStrandedTasks, "daily_tasks"),
            (RepairPass::ForwardFillPlanIds, "qa_records"),
            (RepairPass::ClearFreePracticePlanIds, "qa_records"),
        ];
        for (pass, table) in expect {
            let sql = pass_sql(pass, &RepairScope::All).unwrap();
            assert_eq!(referenced_table(&sql).as_deref(), Some(table), "{pass}");
        }
    }

    #[test]
    fn scope_serializes_tagged() {
        let id = Uuid::nil();
        let json = serde_json::to_value(RepairScope::Plan(id)).unwrap();
        assert_eq!(json["kind"], "plan");
        assert_eq!(json["id"], id.to_string());
        let json = serde_json::to_value(RepairScope::All).unwrap();
        assert_eq!(json["kind"], "all");
    }
}
