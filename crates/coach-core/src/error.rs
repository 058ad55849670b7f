//! Error taxonomy for the coaching core.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by core operations.
///
/// Storage-layer failures arrive as `anyhow::Error` and are wrapped in
/// [`CoachError::Persistence`] with their context chain intact.
#[derive(Debug, Error)]
pub enum CoachError {
    #[error("malformed generator response: {0}")]
    MalformedResponse(String),

    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("generator request failed: {0}")]
    Generator(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no questions available for category {0:?}")]
    NoQuestionsAvailable(String),
}

impl CoachError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Whether the caller supplied something unusable (as opposed to a
    /// failure of this service or its collaborators).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::InvalidInput(_)
                | Self::Conflict(_)
                | Self::NoQuestionsAvailable(_)
        )
    }
}

pub type CoachResult<T> = Result<T, CoachError>;
