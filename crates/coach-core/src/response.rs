//! Parsing and validation of generator output.
//!
//! Completion text is untrusted: it may be wrapped in a markdown fence, may
//! not be JSON at all, or may be JSON of the wrong shape. Everything that
//! leaves this module has been checked field by field.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::CoachError;

/// Share of CJK characters above which an English question is suspicious.
pub const CJK_WARNING_RATIO: f64 = 0.3;

/// A question as returned by the generator, after validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question_text: String,
    pub reference_answer: String,
    pub tags: Vec<String>,
}

/// One day of a generated plan, after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTask {
    pub task_date: NaiveDate,
    pub category: String,
    pub duration: i32,
    pub question_ids: Vec<Uuid>,
}

/// A generated training plan, after validation.
///
/// Allocation values are kept as the generator sent them; normalisation to
/// integer percentages happens in [`crate::plan::allocation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPlan {
    pub category_allocation: BTreeMap<String, f64>,
    pub ai_suggestions: String,
    pub daily_tasks: Vec<GeneratedTask>,
}

fn malformed(msg: impl Into<String>) -> CoachError {
    CoachError::MalformedResponse(msg.into())
}

/// Strip surrounding whitespace and, if present, a markdown code fence
/// (optionally tagged `json`). Returns the text to hand to the JSON parser.
pub fn extract_json_text(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_ticks = &trimmed[open + 3..];
    let body = match after_ticks.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &after_ticks[4..],
        _ => after_ticks,
    };
    let inner = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    inner.trim()
}

fn parse_value(raw: &str) -> Result<Value, CoachError> {
    let text = extract_json_text(raw);
    serde_json::from_str(text).map_err(|e| malformed(format!("invalid JSON: {e}")))
}

/// Fraction of non-whitespace characters in U+4E00..=U+9FA5.
pub fn cjk_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut cjk = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if ('\u{4E00}'..='\u{9FA5}').contains(&c) {
            cjk += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        cjk as f64 / total as f64
    }
}

fn non_empty_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

// ---------------------------------------------------------------------------
// Question batches
// ---------------------------------------------------------------------------

/// Parse a question batch for `category`.
///
/// Rejects the whole batch if it is not a non-empty array or any item lacks
/// a non-empty `question_text` or `reference_answer`. Non-array `tags`
/// become empty; non-string tags are dropped.
pub fn parse_question_batch(raw: &str, category: &str) -> Result<Vec<GeneratedQuestion>, CoachError> {
    let value = parse_value(raw)?;
    let Value::Array(items) = value else {
        return Err(malformed("expected a JSON array of questions"));
    };
    if items.is_empty() {
        return Err(malformed("question array is empty"));
    }

    let mut questions = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| malformed(format!("question {index} is not an object")))?;
        let question_text = non_empty_str(obj, &["question_text", "questionText"])
            .ok_or_else(|| malformed(format!("question {index} has no question_text")))?;
        let reference_answer = non_empty_str(obj, &["reference_answer", "referenceAnswer"])
            .ok_or_else(|| malformed(format!("question {index} has no reference_answer")))?;
        let tags = match obj.get("tags") {
            Some(Value::Array(tags)) => tags
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        };

        if category == "english-oral" {
            let ratio = cjk_ratio(&question_text);
            if ratio > CJK_WARNING_RATIO {
                warn!(index, ratio, "english-oral question is mostly CJK text");
            }
        }

        questions.push(GeneratedQuestion {
            question_text,
            reference_answer,
            tags,
        });
    }
    Ok(questions)
}

// ---------------------------------------------------------------------------
// Training plans
// ---------------------------------------------------------------------------

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    // Accept full timestamps by reading the date prefix.
    let date = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn parse_task(index: usize, item: &Value) -> Result<GeneratedTask, CoachError> {
    let obj = item
        .as_object()
        .ok_or_else(|| malformed(format!("task {index} is not an object")))?;

    let task_date = field(obj, &["task_date", "taskDate", "date"])
        .and_then(parse_date)
        .ok_or_else(|| malformed(format!("task {index} has no valid task_date")))?;
    let category = non_empty_str(obj, &["category"])
        .ok_or_else(|| malformed(format!("task {index} has no category")))?;
    let duration = field(obj, &["duration"])
        .and_then(Value::as_f64)
        .filter(|d| d.is_finite() && *d >= 1.0)
        .ok_or_else(|| malformed(format!("task {index} has no positive duration")))?;
    let question_ids = match field(obj, &["question_ids", "questionIds"]) {
        Some(Value::Array(ids)) => ids
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect(),
        _ => Vec::new(),
    };

    Ok(GeneratedTask {
        task_date,
        category,
        duration: duration.round().min(f64::from(i32::MAX)) as i32,
        question_ids,
    })
}

/// Parse a training plan.
///
/// Requires a `category_allocation` object (alias `categoryAllocation`)
/// whose values are all numeric with at least one positive, and a non-empty
/// `daily_tasks` array (alias `dailyTasks`) whose items each have a date,
/// category and positive duration.
pub fn parse_training_plan(raw: &str) -> Result<GeneratedPlan, CoachError> {
    let value = parse_value(raw)?;
    let obj = value
        .as_object()
        .ok_or_else(|| malformed("expected a JSON object for the plan"))?;

    let alloc_obj = field(obj, &["category_allocation", "categoryAllocation"])
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("plan has no category_allocation object"))?;
    let mut category_allocation = BTreeMap::new();
    for (category, share) in alloc_obj {
        let share = share
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| malformed(format!("allocation for {category:?} is not a number")))?;
        category_allocation.insert(category.clone(), share);
    }
    if !category_allocation.values().any(|v| *v > 0.0) {
        return Err(malformed("allocation has no positive share"));
    }

    let tasks = field(obj, &["daily_tasks", "dailyTasks"])
        .and_then(Value::as_array)
        .filter(|tasks| !tasks.is_empty())
        .ok_or_else(|| malformed("plan has no daily_tasks"))?;
    let daily_tasks = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| parse_task(i, t))
        .collect::<Result<Vec<_>, _>>()?;

    let ai_suggestions = field(obj, &["ai_suggestions", "aiSuggestions"])
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_owned();

    Ok(GeneratedPlan {
        category_allocation,
        ai_suggestions,
        daily_tasks,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        assert_eq!(extract_json_text("```json\n[1]\n```"), "[1]");
        assert_eq!(extract_json_text("```JSON [2] ```"), "[2]");
        assert_eq!(extract_json_text("Here you go:\n```\n{}\n```\nThanks"), "{}");
        assert_eq!(extract_json_text("  [3]  "), "[3]");
        assert_eq!(extract_json_text("```json\n[4]"), "[4]");
    }

    #[test]
    fn fenced_single_item_batch() {
        let raw = "```json\n[{\"question_text\":\"Q\",\"reference_answer\":\"A\",\"tags\":[\"t\"]}]\n```";
        let batch = parse_question_batch(raw, "logic-thinking").unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].tags, vec!["t"]);
    }

    #[test]
    fn not_json_is_malformed() {
        let err = parse_question_batch("not json", "logic-thinking").unwrap_err();
        assert!(matches!(err, CoachError::MalformedResponse(_)));
    }

    #[test]
    fn batch_shape_is_enforced() {
        assert!(parse_question_batch("[]", "x").is_err());
        assert!(parse_question_batch("{\"question_text\":\"Q\"}", "x").is_err());
        assert!(parse_question_batch("[{\"question_text\":\"Q\"}]", "x").is_err());
        assert!(
            parse_question_batch("[{\"question_text\":\"  \",\"reference_answer\":\"A\"}]", "x")
                .is_err()
        );
        assert!(parse_question_batch("[42]", "x").is_err());
    }

    #[test]
    fn tags_default_and_filter() {
        let raw = r#"[
            {"question_text":"Q1","reference_answer":"A1","tags":"oops"},
            {"question_text":"Q2","reference_answer":"A2","tags":["ok", 3, null]},
            {"question_text":"Q3","reference_answer":"A3"}
        ]"#;
        let batch = parse_question_batch(raw, "x").unwrap();
        assert!(batch[0].tags.is_empty());
        assert_eq!(batch[1].tags, vec!["ok"]);
        assert!(batch[2].tags.is_empty());
    }

    #[test]
    fn cjk_heavy_english_question_is_still_accepted() {
        let raw = r#"[{"question_text":"请用英文介绍你自己","reference_answer":"A"}]"#;
        assert!(cjk_ratio("请用英文介绍你自己") > CJK_WARNING_RATIO);
        assert_eq!(parse_question_batch(raw, "english-oral").unwrap().len(), 1);
    }

    #[test]
    fn cjk_ratio_ignores_whitespace() {
        assert_eq!(cjk_ratio("   "), 0.0);
        assert_eq!(cjk_ratio("ab 中文"), 0.5);
    }

    #[test]
    fn parses_plan_with_either_casing() {
        let snake = r#"{
            "category_allocation": {"english-oral": 60, "logic-thinking": 40},
            "ai_suggestions": "Practise daily.",
            "daily_tasks": [
                {"task_date": "2025-03-01", "category": "english-oral", "duration": 30},
                {"task_date": "2025-03-02T00:00:00Z", "category": "logic-thinking", "duration": 30.4,
                 "question_ids": ["not-a-uuid", "00000000-0000-0000-0000-000000000001"]}
            ]
        }"#;
        let plan = parse_training_plan(snake).unwrap();
        assert_eq!(plan.daily_tasks.len(), 2);
        assert_eq!(plan.daily_tasks[1].duration, 30);
        assert_eq!(plan.daily_tasks[1].question_ids.len(), 1);
        assert_eq!(plan.ai_suggestions, "Practise daily.");

        let camel = r#"{"categoryAllocation": {"a": 1}, "dailyTasks": [
            {"taskDate": "2025-03-01", "category": "a", "duration": 10}]}"#;
        let plan = parse_training_plan(camel).unwrap();
        assert_eq!(plan.category_allocation.get("a"), Some(&1.0));
        assert!(plan.ai_suggestions.is_empty());
    }

    #[test]
    fn plan_validation_failures() {
        let cases = [
            r#"[]"#,
            r#"{"daily_tasks": [{"task_date":"2025-03-01","category":"a","duration":1}]}"#,
            r#"{"category_allocation": {"a": 100}, "daily_tasks": []}"#,
            r#"{"category_allocation": {"a": "lots"}, "daily_tasks": [{"task_date":"2025-03-01","category":"a","duration":1}]}"#,
            r#"{"category_allocation": {"a": 0}, "daily_tasks": [{"task_date":"2025-03-01","category":"a","duration":1}]}"#,
            r#"{"category_allocation": {"a": 100}, "daily_tasks": [{"task_date":"March 1","category":"a","duration":1}]}"#,
            r#"{"category_allocation": {"a": 100}, "daily_tasks": [{"task_date":"2025-03-01","category":"a","duration":0}]}"#,
            r#"{"category_allocation": {"a": 100}, "daily_tasks": [{"task_date":"2025-03-01","duration":30}]}"#,
        ];
        for raw in cases {
            assert!(
                matches!(parse_training_plan(raw), Err(CoachError::MalformedResponse(_))),
                "accepted: {raw}"
            );
        }
    }
}
