//! Interview coaching core: question availability, training plans,
//! practice sessions, recorded weaknesses and consistency repair.

pub mod error;
pub mod generator;
pub mod plan;
pub mod prompts;
pub mod questions;
pub mod repair;
pub mod response;
pub mod session;
pub mod weakness;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{CoachError, CoachResult};
