//! Query result - rows materialized as column name -> JSON value maps

use serde::{Deserialize, Serialize};

/// One result row, keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Materialized result of one query execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Column names in select-list order
    pub columns: Vec<String>,

    /// Rows in the order the database returned them
    pub rows: Vec<Row>,
}

impl ExecutionResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
