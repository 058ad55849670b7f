//! Availability guarantor.
//!
//! Returns up to `count` questions for a category, topping up the pool with
//! generated questions when it is short. Tiers run strictly in order and each
//! at most once:
//!
//! 1. Pool: sample the stored pool; done if it is already large enough.
//! 2. Generated: ask for a batch with the full parameters and persist it.
//! 3. Degraded: only when a school was given and tier 2 failed outright,
//!    retry once without the school and with a smaller batch.
//! 4. Fallback: whatever the pool held before generation.
//!
//! Nothing here returns an error. Failures are logged and the next tier runs.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use coach_db::gateway::MAX_PAGE_SIZE;
use coach_db::models::{Difficulty, Question, QuestionSource};
use coach_db::queries::questions::NewQuestion;

use super::store::QuestionStore;
use crate::error::CoachError;
use crate::generator::TextGenerator;
use crate::prompts::{self, QUESTION_MAX_TOKENS, QUESTION_TEMPERATURE};
use crate::response::{GeneratedQuestion, parse_question_batch};

/// Smallest batch worth asking the generator for.
pub const MIN_GENERATION: usize = 3;
/// Extra questions requested on top of the deficit.
pub const GENERATION_HEADROOM: usize = 2;
/// Largest batch requested in one call.
pub const MAX_GENERATION: usize = 10;
/// Largest batch requested by the degraded tier.
pub const DEGRADED_MAX_GENERATION: usize = 5;

/// Largest count one request can be served. A pool sample is a single page,
/// so larger counts are clamped to this.
pub const MAX_QUESTION_COUNT: usize = MAX_PAGE_SIZE as usize;

/// What the caller needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub category: String,
    pub count: usize,
    #[serde(default)]
    pub school_code: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl QuestionRequest {
    pub fn new(category: impl Into<String>, count: usize) -> Self {
        Self {
            category: category.into(),
            count,
            school_code: None,
            difficulty: Difficulty::default(),
        }
    }

    pub fn with_school(mut self, school_code: impl Into<String>) -> Self {
        self.school_code = Some(school_code.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }
}

/// A generated question that could not be stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub item: GeneratedQuestion,
    pub error: String,
}

/// Outcome of persisting one generated batch item by item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub succeeded: Vec<Question>,
    pub failed: Vec<BatchFailure>,
}

/// The tier that produced the returned questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Pool,
    Generated,
    Degraded,
    Fallback,
}

/// Questions plus how they were obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Availability {
    pub questions: Vec<Question>,
    pub tier: Tier,
    /// Persistence outcome of the generation tier that ran last, if any.
    pub batch: Option<BatchResult>,
}

impl Availability {
    fn new(mut questions: Vec<Question>, count: usize, tier: Tier, batch: Option<BatchResult>) -> Self {
        questions.truncate(count);
        Self {
            questions,
            tier,
            batch,
        }
    }
}

async fn sample_or_empty(store: &dyn QuestionStore, category: &str, count: usize) -> Vec<Question> {
    match store.sample(category, count).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %format!("{e:#}"), category, "question pool query failed, treating as empty");
            Vec::new()
        }
    }
}

fn larger(a: Vec<Question>, b: Vec<Question>) -> Vec<Question> {
    if a.len() >= b.len() { a } else { b }
}

/// Ask for `size` questions and persist every valid item individually.
///
/// Fails only when the generator call fails or its output is rejected.
async fn generate_batch(
    store: &dyn QuestionStore,
    generator: &dyn TextGenerator,
    request: &QuestionRequest,
    school_code: Option<&str>,
    size: usize,
) -> Result<BatchResult, CoachError> {
    let messages = prompts::question_batch(&request.category, request.difficulty, school_code, size);
    let raw = generator
        .complete(&messages, QUESTION_TEMPERATURE, QUESTION_MAX_TOKENS)
        .await?;
    let items = parse_question_batch(&raw, &request.category)?;

    let mut batch = BatchResult::default();
    for item in items {
        let new = NewQuestion {
            category: &request.category,
            difficulty: request.difficulty,
            question_text: &item.question_text,
            reference_answer: &item.reference_answer,
            tags: &item.tags,
            school_code,
            source: QuestionSource::AiGenerated,
        };
        match store.insert(&new).await {
            Ok(row) => batch.succeeded.push(row),
            Err(e) => {
                warn!(error = %format!("{e:#}"), category = %request.category, "failed to store generated question");
                batch.failed.push(BatchFailure {
                    error: format!("{e:#}"),
                    item,
                });
            }
        }
    }
    info!(
        category = %request.category,
        stored = batch.succeeded.len(),
        failed = batch.failed.len(),
        "generated question batch"
    );
    Ok(batch)
}

/// Return up to `request.count` questions, recording which tier supplied them.
pub async fn ensure_available_detailed(
    store: &dyn QuestionStore,
    generator: &dyn TextGenerator,
    request: &QuestionRequest,
) -> Availability {
    let count = request.count.min(MAX_QUESTION_COUNT);
    if count == 0 {
        return Availability::new(Vec::new(), 0, Tier::Pool, None);
    }
    if count < request.count {
        warn!(
            category = %request.category,
            requested = request.count,
            count,
            "question count clamped"
        );
    }

    let pool = sample_or_empty(store, &request.category, count).await;
    if pool.len() >= count {
        debug!(category = %request.category, count, "pool satisfies request");
        return Availability::new(pool, count, Tier::Pool, None);
    }

    let need = (count - pool.len()).max(MIN_GENERATION);
    let size = (need + GENERATION_HEADROOM).min(MAX_GENERATION);
    info!(
        category = %request.category,
        pool = pool.len(),
        count,
        generate = size,
        "pool short, generating questions"
    );

    match generate_batch(store, generator, request, request.school_code.as_deref(), size).await {
        Ok(batch) => {
            let refreshed = sample_or_empty(store, &request.category, count).await;
            let questions = if refreshed.len() >= count {
                refreshed
            } else {
                larger(refreshed, pool)
            };
            return Availability::new(questions, count, Tier::Generated, Some(batch));
        }
        Err(e) => warn!(error = %e, category = %request.category, "question generation failed"),
    }

    if request.school_code.is_some() {
        let size = size.min(DEGRADED_MAX_GENERATION);
        match generate_batch(store, generator, request, None, size).await {
            Ok(batch) => {
                let refreshed = sample_or_empty(store, &request.category, count).await;
                return Availability::new(larger(refreshed, pool), count, Tier::Degraded, Some(batch));
            }
            Err(e) => warn!(error = %e, category = %request.category, "degraded question generation failed"),
        }
    }

    warn!(
        category = %request.category,
        available = pool.len(),
        count,
        "returning pre-generation pool"
    );
    Availability::new(pool, count, Tier::Fallback, None)
}

/// Return up to `request.count` questions for the category. Never fails; the
/// result may be shorter than requested, or empty.
pub async fn ensure_available(
    store: &dyn QuestionStore,
    generator: &dyn TextGenerator,
    request: &QuestionRequest,
) -> Vec<Question> {
    ensure_available_detailed(store, generator, request)
        .await
        .questions
}
