pub mod plans;
pub mod qa_records;
pub mod questions;
pub mod sessions;
pub mod tasks;
pub mod weaknesses;
