//! In-memory fakes for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::bail;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use coach_db::decode::Lenient;
use coach_db::models::{Difficulty, Question, QuestionSource};
use coach_db::queries::questions::NewQuestion;

use crate::error::CoachError;
use crate::generator::{ChatMessage, TextGenerator};
use crate::questions::QuestionStore;

/// Replays canned completions in order, then fails.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// The user message of every call so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, CoachError> {
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoachError::Generator("connection refused".into()))
    }
}

/// A question batch in the generator's JSON shape, wrapped in a fence.
pub fn question_batch_json(n: usize) -> String {
    let items: Vec<_> = (1..=n)
        .map(|i| {
            serde_json::json!({
                "question_text": format!("Question {i}?"),
                "reference_answer": format!("Answer {i}."),
                "tags": ["generated"],
            })
        })
        .collect();
    format!("```json\n{}\n```", serde_json::Value::Array(items))
}

/// A question pool held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Question>>,
    fail_insert_pattern: Option<String>,
    fail_samples: bool,
}

impl MemoryStore {
    pub fn with_questions(category: &str, n: usize) -> Self {
        let rows = (0..n)
            .map(|i| Question {
                id: Uuid::new_v4(),
                category: category.to_owned(),
                difficulty: Difficulty::Medium,
                question_text: format!("Seed {i}"),
                reference_answer: String::new(),
                tags: Lenient(vec![]),
                school_code: None,
                source: QuestionSource::Seed,
                created_at: Utc::now(),
            })
            .collect();
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn fail_inserts_containing(mut self, pattern: &str) -> Self {
        self.fail_insert_pattern = Some(pattern.to_owned());
        self
    }

    pub fn fail_samples(mut self) -> Self {
        self.fail_samples = true;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<Question> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn sample(&self, category: &str, limit: usize) -> anyhow::Result<Vec<Question>> {
        if self.fail_samples {
            bail!("pool unavailable");
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.category == category)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert(&self, question: &NewQuestion<'_>) -> anyhow::Result<Question> {
        let rejected = self
            .fail_insert_pattern
            .as_deref()
            .is_some_and(|p| question.question_text.contains(p));
        if rejected {
            bail!("insert rejected");
        }
        let row = Question {
            id: Uuid::new_v4(),
            category: question.category.to_owned(),
            difficulty: question.difficulty,
            question_text: question.question_text.to_owned(),
            reference_answer: question.reference_answer.to_owned(),
            tags: Lenient(question.tags.to_vec()),
            school_code: question.school_code.map(str::to_owned),
            source: question.source,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }
}
