use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::RepairScope;

/// Upper bound on the sample of unresolved rows kept in a report.
pub const MAX_REMAINING_SAMPLE: i64 = 20;

/// One repair pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPass {
    PruneOrphanRecords,
    ClearDanglingTaskRefs,
    BackfillSessionQuestions,
    DeleteEmptySessions,
    ResetStrandedTasks,
    ForwardFillPlanIds,
    ClearFreePracticePlanIds,
}

impl RepairPass {
    pub const ALL: [RepairPass; 7] = [
        RepairPass::PruneOrphanRecords,
        RepairPass::ClearDanglingTaskRefs,
        RepairPass::BackfillSessionQuestions,
        RepairPass::DeleteEmptySessions,
        RepairPass::ResetStrandedTasks,
        RepairPass::ForwardFillPlanIds,
        RepairPass::ClearFreePracticePlanIds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RepairPass::PruneOrphanRecords => "prune_orphan_records",
            RepairPass::ClearDanglingTaskRefs => "clear_dangling_task_refs",
            RepairPass::BackfillSessionQuestions => "backfill_session_questions",
            RepairPass::DeleteEmptySessions => "delete_empty_sessions",
            RepairPass::ResetStrandedTasks => "reset_stranded_tasks",
            RepairPass::ForwardFillPlanIds => "forward_fill_plan_ids",
            RepairPass::ClearFreePracticePlanIds => "clear_free_practice_plan_ids",
        }
    }
}

impl fmt::Display for RepairPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows changed by one pass. `touched` is `None` when the pass does not
/// apply to the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassOutcome {
    pub pass: RepairPass,
    pub touched: Option<u64>,
}

/// A record whose `plan_id` still disagrees with its session's task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RemainingIssue {
    pub record_id: Uuid,
    pub session_id: Uuid,
    pub stored_plan_id: Option<Uuid>,
    pub expected_plan_id: Option<Uuid>,
    /// False when the record's session no longer exists.
    pub session_exists: bool,
}

/// Outcome of a repair run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairReport {
    pub scope: RepairScope,
    pub passes: Vec<PassOutcome>,
    /// Rows changed across all passes.
    pub touched: u64,
    /// Total number of records still in violation after the run.
    pub remaining_count: i64,
    /// Up to [`MAX_REMAINING_SAMPLE`] of those records.
    pub remaining_issues: Vec<RemainingIssue>,
}

impl RepairReport {
    pub(super) fn new(
        scope: RepairScope,
        passes: Vec<PassOutcome>,
        remaining_count: i64,
        remaining_issues: Vec<RemainingIssue>,
    ) -> Self {
        let touched = passes.iter().filter_map(|p| p.touched).sum();
        Self {
            scope,
            passes,
            touched,
            remaining_count,
            remaining_issues,
        }
    }

    /// Rows changed by `pass`, zero when it did not run.
    pub fn touched_by(&self, pass: RepairPass) -> u64 {
        self.passes
            .iter()
            .find(|p| p.pass == pass)
            .and_then(|p| p.touched)
            .unwrap_or(0)
    }

    pub fn is_clean(&self) -> bool {
        self.remaining_count == 0
    }
}
