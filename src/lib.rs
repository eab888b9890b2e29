//! Dashboard insights
//!
//! Turns BI dashboard metadata into one read-only SQL query and a short
//! natural-language insight, validates the query and runs it against the
//! dashboard's database.

pub mod api;
pub mod cache;
pub mod config;
pub mod documents;
pub mod error;
pub mod execution;
pub mod generator;
pub mod llm;
pub mod metadata;
pub mod observability;
pub mod pipeline;
pub mod prompts;
pub mod schema_analyzer;
pub mod schema_rag;
pub mod sql_guard;
pub mod superset;
pub mod training_pack;

pub use error::{InsightError, Result};
