//! Helpers shared by the coach-core integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use coach_core::error::CoachError;
use coach_core::generator::{ChatMessage, TextGenerator};
use coach_core::plan::{DateRange, PlanRequest};

/// Replays canned completions, then fails like an unreachable service.
#[derive(Default)]
pub struct Replay {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<usize>,
}

impl Replay {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TextGenerator for Replay {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, CoachError> {
        *self.calls.lock().unwrap() += 1;
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoachError::Generator("service unavailable".into()))
    }
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
}

pub fn plan_request(student: &str, first: u32, last: u32) -> PlanRequest {
    PlanRequest {
        student_name: student.into(),
        target_school: "SPCC".into(),
        range: DateRange::new(date(first), date(last)).unwrap(),
        daily_duration: 30,
    }
}

pub fn question_batch(n: usize) -> String {
    let items: Vec<_> = (1..=n)
        .map(|i| {
            serde_json::json!({
                "question_text": format!("Generated question {i}?"),
                "reference_answer": format!("Point {i}."),
                "tags": ["ai"],
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}
