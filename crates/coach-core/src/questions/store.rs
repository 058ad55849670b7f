use async_trait::async_trait;

use coach_db::Gateway;
use coach_db::models::Question;
use coach_db::queries::questions::{self, NewQuestion};

/// Read and write access to the question pool.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Up to `limit` random questions from `category`.
    async fn sample(&self, category: &str, limit: usize) -> anyhow::Result<Vec<Question>>;

    /// Persist one question and return the stored row.
    async fn insert(&self, question: &NewQuestion<'_>) -> anyhow::Result<Question>;
}

// Compile-time assertion: QuestionStore must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn QuestionStore) {}
};

#[async_trait]
impl QuestionStore for Gateway {
    async fn sample(&self, category: &str, limit: usize) -> anyhow::Result<Vec<Question>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        questions::sample_by_category(self, category, limit).await
    }

    async fn insert(&self, question: &NewQuestion<'_>) -> anyhow::Result<Question> {
        questions::insert_question(self, question).await
    }
}
