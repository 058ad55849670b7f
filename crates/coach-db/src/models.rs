use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::decode::Lenient;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Error returned when a stored or user-supplied string names no variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for EnumParseError {}

fn parse_error(kind: &'static str, value: &str) -> EnumParseError {
    EnumParseError {
        kind,
        value: value.to_owned(),
    }
}

// ---------------------------------------------------------------------------

/// Difficulty of a practice question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(parse_error("difficulty", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Where a question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
    Seed,
    Manual,
    AiGenerated,
    InterviewMemory,
}

impl QuestionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Manual => "manual",
            Self::AiGenerated => "ai_generated",
            Self::InterviewMemory => "interview_memory",
        }
    }
}

impl fmt::Display for QuestionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionSource {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seed" => Ok(Self::Seed),
            "manual" => Ok(Self::Manual),
            "ai_generated" => Ok(Self::AiGenerated),
            "interview_memory" => Ok(Self::InterviewMemory),
            other => Err(parse_error("question source", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Status of a training plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Completed,
    Archived,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(parse_error("plan status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Status of a daily task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(parse_error("task status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Status of a practice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Paused,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "paused" => Ok(Self::Paused),
            other => Err(parse_error("session status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// How a session is conducted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    TextQa,
    AiInterview,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextQa => "text_qa",
            Self::AiInterview => "ai_interview",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_qa" => Ok(Self::TextQa),
            "ai_interview" => Ok(Self::AiInterview),
            other => Err(parse_error("session mode", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Severity of a recorded weakness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(parse_error("severity", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Progress on a recorded weakness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WeaknessStatus {
    #[default]
    Active,
    Improved,
    Resolved,
}

impl WeaknessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Improved => "improved",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for WeaknessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeaknessStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "improved" => Ok(Self::Improved),
            "resolved" => Ok(Self::Resolved),
            other => Err(parse_error("weakness status", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A practice question.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub category: String,
    pub difficulty: Difficulty,
    pub question_text: String,
    pub reference_answer: String,
    pub tags: Lenient<Vec<String>>,
    pub school_code: Option<String>,
    pub source: QuestionSource,
    pub created_at: DateTime<Utc>,
}

/// A training plan. `category_allocation` maps category to percent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub student_name: String,
    pub target_school: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: i32,
    pub daily_duration: i32,
    pub category_allocation: Lenient<BTreeMap<String, i32>>,
    pub ai_suggestions: String,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

/// One scheduled day of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyTask {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub task_date: NaiveDate,
    pub category: String,
    pub duration: i32,
    pub question_ids: Lenient<Vec<Uuid>>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

/// A practice session. `task_id == None` is free practice.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub task_id: Option<Uuid>,
    pub category: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub question_ids: Option<Lenient<Vec<Uuid>>>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One answered question. `plan_id` is denormalized from
/// `sessions.task_id -> daily_tasks.plan_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QaRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub question_id: Option<Uuid>,
    pub question_text: String,
    pub answer_text: String,
    pub response_time: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// A recorded student weakness.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Weakness {
    pub id: Uuid,
    pub student_name: Option<String>,
    pub category: String,
    pub weakness_type: String,
    pub severity: Severity,
    pub description: String,
    pub example_text: Option<String>,
    pub improvement_suggestions: Option<String>,
    pub related_topics: Lenient<Vec<String>>,
    pub status: WeaknessStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
