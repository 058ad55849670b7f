//! Recorded student weaknesses: the input to targeted plan generation.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use coach_db::models::{Severity, Weakness, WeaknessStatus};
use coach_db::queries::weaknesses::{self, NewWeakness, WeaknessFilter, WeaknessSummary};
use coach_db::{Gateway, Page};

use crate::error::{CoachError, CoachResult};

/// Input for [`record_weakness`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordWeakness {
    #[serde(default)]
    pub student_name: Option<String>,
    pub category: String,
    /// Free-form kind, e.g. `grammar` or `structure`.
    pub weakness_type: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub example_text: Option<String>,
    #[serde(default)]
    pub improvement_suggestions: Option<String>,
    #[serde(default)]
    pub related_topics: Vec<String>,
}

fn default_severity() -> Severity {
    Severity::Medium
}

/// Query-string filters for [`list_weaknesses`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeaknessQuery {
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<WeaknessStatus>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Store a new weakness with status `active`.
pub async fn record_weakness(gateway: &Gateway, input: &RecordWeakness) -> CoachResult<Weakness> {
    let category = input.category.trim();
    if category.is_empty() {
        return Err(CoachError::InvalidInput("weakness category must not be empty".into()));
    }
    let weakness_type = input.weakness_type.trim();
    if weakness_type.is_empty() {
        return Err(CoachError::InvalidInput("weakness type must not be empty".into()));
    }

    let weakness = weaknesses::insert_weakness(
        gateway,
        &NewWeakness {
            student_name: non_empty(input.student_name.as_deref()),
            category,
            weakness_type,
            severity: input.severity,
            description: input.description.trim(),
            example_text: non_empty(input.example_text.as_deref()),
            improvement_suggestions: non_empty(input.improvement_suggestions.as_deref()),
            related_topics: &input.related_topics,
        },
    )
    .await?;

    info!(
        weakness_id = %weakness.id,
        category = %weakness.category,
        severity = %weakness.severity,
        "weakness recorded"
    );
    Ok(weakness)
}

pub async fn get_weakness(gateway: &Gateway, id: Uuid) -> CoachResult<Weakness> {
    weaknesses::get_weakness(gateway, id)
        .await?
        .ok_or_else(|| CoachError::not_found("weakness", id))
}

pub async fn list_weaknesses(
    gateway: &Gateway,
    query: &WeaknessQuery,
    page: Page,
) -> CoachResult<Vec<Weakness>> {
    let filter = WeaknessFilter {
        student_name: non_empty(query.student_name.as_deref()),
        category: non_empty(query.category.as_deref()),
        status: query.status,
        severity: query.severity,
    };
    Ok(weaknesses::list_weaknesses(gateway, &filter, page).await?)
}

/// Move a weakness to `status`.
pub async fn set_weakness_status(
    gateway: &Gateway,
    id: Uuid,
    status: WeaknessStatus,
) -> CoachResult<Weakness> {
    let weakness = weaknesses::update_weakness_status(gateway, id, status)
        .await?
        .ok_or_else(|| CoachError::not_found("weakness", id))?;
    info!(weakness_id = %id, status = %status, "weakness status changed");
    Ok(weakness)
}

pub async fn weakness_summary(
    gateway: &Gateway,
    student_name: Option<&str>,
) -> CoachResult<WeaknessSummary> {
    Ok(weaknesses::weakness_summary(gateway, non_empty(student_name)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_body_defaults() {
        let input: RecordWeakness = serde_json::from_str(
            r#"{"category": "logic-thinking", "weakness_type": "reasoning"}"#,
        )
        .unwrap();
        assert_eq!(input.severity, Severity::Medium);
        assert!(input.student_name.is_none());
        assert!(input.related_topics.is_empty());
        assert!(input.description.is_empty());
    }

    #[test]
    fn query_parses_enum_filters() {
        let query: WeaknessQuery =
            serde_json::from_str(r#"{"status": "resolved", "severity": "high"}"#).unwrap();
        assert_eq!(query.status, Some(WeaknessStatus::Resolved));
        assert_eq!(query.severity, Some(Severity::High));
        assert!(serde_json::from_str::<WeaknessQuery>(r#"{"status": "gone"}"#).is_err());
    }

    #[test]
    fn blank_optional_text_is_dropped() {
        assert_eq!(non_empty(Some("  ")), None);
        assert_eq!(non_empty(Some(" Cara ")), Some("Cara"));
        assert_eq!(non_empty(None), None);
    }
}
