//! Question pool access and the availability guarantor.

pub mod guarantor;
pub mod store;

pub use guarantor::{
    Availability, BatchFailure, BatchResult, MAX_QUESTION_COUNT, QuestionRequest, Tier,
    ensure_available, ensure_available_detailed,
};
pub use store::QuestionStore;
