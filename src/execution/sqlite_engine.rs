//! SQLite Execution Engine
//!
//! Opens the database file read-only for each query. rusqlite is blocking, so
//! the work runs on the blocking pool and a progress handler interrupts the
//! statement once the deadline passes.

use crate::error::{InsightError, Result};
use crate::execution::result::{ExecutionResult, Row};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// VM instructions between deadline checks
const PROGRESS_INTERVAL: i32 = 1_000;

#[derive(Debug, Default, Clone)]
pub struct SqliteEngine;

impl SqliteEngine {
    pub fn new() -> Self {
        Self
    }

    pub async fn fetch_rows(&self, path: &Path, sql: &str, timeout: Duration) -> Result<ExecutionResult> {
        let path: PathBuf = path.to_path_buf();
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || run_query(&path, &sql, timeout))
            .await
            .map_err(|e| InsightError::Execution(format!("SQLite worker failed: {}", e)))?
    }
}

fn run_query(path: &Path, sql: &str, timeout: Duration) -> Result<ExecutionResult> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| {
        InsightError::Execution(format!("Failed to open SQLite database {}: {}", path.display(), e))
    })?;

    let deadline = Instant::now() + timeout;
    conn.progress_handler(PROGRESS_INTERVAL, Some(move || Instant::now() >= deadline));

    let mut stmt = conn.prepare(sql).map_err(|e| classify_error(e, timeout))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();

    let mut rows = stmt.query([]).map_err(|e| classify_error(e, timeout))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| classify_error(e, timeout))? {
        let mut map = Row::new();
        for (idx, column) in columns.iter().enumerate() {
            let value = row.get_ref(idx).map_err(|e| classify_error(e, timeout))?;
            map.insert(column.clone(), sqlite_value(value));
        }
        out.push(map);
    }

    debug!("SQLite returned {} rows", out.len());
    Ok(ExecutionResult::new(columns, out))
}

fn classify_error(err: rusqlite::Error, timeout: Duration) -> InsightError {
    if err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
        InsightError::Execution(format!(
            "statement timeout of {}s exceeded",
            timeout.as_secs()
        ))
    } else {
        InsightError::Execution(format!("SQL execution error: {}", err))
    }
}

fn sqlite_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(bytes.iter().map(|b| format!("{:02x}", b)).collect()),
    }
}
