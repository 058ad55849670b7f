//! Training plan generation.
//!
//! A plan is drafted from generator output (or a static template when the
//! generator fails), normalised so its numeric invariants hold, and stored
//! together with its daily tasks in one transaction.
//!
//! # Invariants of every stored plan
//!
//! - `category_allocation` values are integers summing to exactly 100.
//! - Every day of the date range has at least one task.
//! - Weakness plans give the weakness category at least 30% and at least
//!   `ceil(0.4 * total_days)` tasks.

pub mod allocation;
pub mod service;

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use coach_db::models::{DailyTask, Plan};

use crate::error::CoachError;

pub use service::{
    draft_plan, draft_plan_from_weakness, generate_from_weakness, generate_plan,
    generate_plan_from_weakness, get_plan_with_tasks,
};

// ---------------------------------------------------------------------------
// DateRange
// ---------------------------------------------------------------------------

/// Longest plan, in days.
pub const MAX_PLAN_DAYS: usize = 366;

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Fails with `InvalidInput` when `end` is before `start` or the range
    /// covers more than [`MAX_PLAN_DAYS`] days.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoachError> {
        if end < start {
            return Err(CoachError::InvalidInput(format!(
                "end date {end} is before start date {start}"
            )));
        }
        let days = (end - start).num_days() + 1;
        if days > MAX_PLAN_DAYS as i64 {
            return Err(CoachError::InvalidInput(format!(
                "date range covers {days} days, at most {MAX_PLAN_DAYS} allowed"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days, counting both ends.
    pub fn total_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every day of the range in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..self.total_days() as u64).filter_map(|i| self.start.checked_add_days(Days::new(i)))
    }
}

// ---------------------------------------------------------------------------
// Requests and drafts
// ---------------------------------------------------------------------------

/// Input for plan generation.
#[derive(Debug, Clone, Serialize)]
pub struct PlanRequest {
    pub student_name: String,
    pub target_school: String,
    pub range: DateRange,
    /// Minutes available per day.
    pub daily_duration: i32,
}

impl PlanRequest {
    pub fn validate(&self) -> Result<(), CoachError> {
        if self.student_name.trim().is_empty() {
            return Err(CoachError::InvalidInput("student name must not be empty".into()));
        }
        if self.daily_duration <= 0 {
            return Err(CoachError::InvalidInput(format!(
                "daily duration must be positive, got {}",
                self.daily_duration
            )));
        }
        Ok(())
    }
}

/// Where a draft's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftSource {
    Generated,
    Template,
    WeaknessFallback,
}

/// One scheduled day before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftTask {
    pub task_date: NaiveDate,
    pub category: String,
    pub duration: i32,
    pub question_ids: Vec<Uuid>,
}

/// A normalised plan ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub category_allocation: BTreeMap<String, i32>,
    pub ai_suggestions: String,
    pub tasks: Vec<DraftTask>,
    pub source: DraftSource,
}

/// A stored plan with its tasks in date order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanWithTasks {
    pub plan: Plan,
    pub tasks: Vec<DailyTask>,
}
