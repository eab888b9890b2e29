//! Query execution against the dataset's database
//!
//! `QueryExecutor` is the entry point; engines behind `QueryEngine` own the
//! driver-specific connection handling.

pub mod engine;
pub mod executor;
pub mod postgres_engine;
pub mod result;
pub mod sqlite_engine;

pub use engine::{ConnectionTarget, DriverEngine, QueryEngine};
pub use executor::{apply_limit, QueryExecutor};
pub use result::{ExecutionResult, Row};
