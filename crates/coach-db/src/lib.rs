//! Storage layer for the interview-coaching core.
//!
//! All table access goes through [`gateway::Gateway`], which caches reads
//! and invalidates them on writes. Row types live in [`models`]; typed query
//! helpers live in [`queries`].

pub mod cache;
pub mod config;
pub mod decode;
pub mod gateway;
pub mod models;
pub mod pool;
pub mod queries;

pub use gateway::{Gateway, Page, SqlParam};
