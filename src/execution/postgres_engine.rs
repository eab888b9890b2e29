//! Postgres Execution Engine
//!
//! One connection per query. The session is opened read-only
//! (`default_transaction_read_only`) with a `statement_timeout`, so the
//! server refuses writes such as `SELECT ... INTO` and cancels anything that
//! runs too long.

use crate::error::{InsightError, Result};
use crate::execution::engine::redact;
use crate::execution::result::{ExecutionResult, Row};
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Executor, Row as _, Statement, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// SQLSTATE for a statement cancelled by `statement_timeout`
const QUERY_CANCELED: &str = "57014";

#[derive(Debug, Default, Clone)]
pub struct PostgresEngine;

impl PostgresEngine {
    pub fn new() -> Self {
        Self
    }

    pub async fn fetch_rows(&self, url: &str, sql: &str, timeout: Duration) -> Result<ExecutionResult> {
        let options = connect_options(url, timeout)?;

        let mut conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| InsightError::Execution(format!("Failed to connect to {}: {}", redact(url), e)))?;

        let fetched = run_statement(&mut conn, sql).await;

        if let Err(e) = conn.close().await {
            warn!("Failed to close Postgres connection cleanly: {}", e);
        }

        let (columns, rows) = fetched.map_err(|e| classify_error(e, timeout))?;
        debug!("Postgres returned {} rows", rows.len());
        materialize(columns, &rows)
    }
}

/// Session options: read-only transactions and a server-side timeout
pub fn connect_options(url: &str, timeout: Duration) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(url)
        .map_err(|e| InsightError::Execution(format!("Invalid Postgres URL {}: {}", redact(url), e)))?
        .options([
            ("statement_timeout", timeout.as_millis().to_string()),
            ("default_transaction_read_only", "on".to_string()),
        ]);
    Ok(options)
}

/// Prepare first so column names are known even when no row comes back
async fn run_statement(
    conn: &mut PgConnection,
    sql: &str,
) -> std::result::Result<(Vec<String>, Vec<PgRow>), sqlx::Error> {
    let statement = (&mut *conn).prepare(sql).await?;
    let columns = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let rows = statement.query().fetch_all(&mut *conn).await?;
    Ok((columns, rows))
}

fn classify_error(err: sqlx::Error, timeout: Duration) -> InsightError {
    let timed_out = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == QUERY_CANCELED)
        .unwrap_or(false);

    if timed_out {
        InsightError::Execution(format!(
            "statement timeout of {}s exceeded",
            timeout.as_secs()
        ))
    } else {
        InsightError::Execution(format!("SQL execution error: {}", err))
    }
}

fn materialize(columns: Vec<String>, rows: &[PgRow]) -> Result<ExecutionResult> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut map = Row::new();
        for (idx, column) in columns.iter().enumerate() {
            map.insert(column.clone(), pg_value(row, idx)?);
        }
        out.push(map);
    }

    Ok(ExecutionResult::new(columns, out))
}

fn decode_err(column: &str, e: sqlx::Error) -> InsightError {
    InsightError::Execution(format!("Failed to decode column {}: {}", column, e))
}

/// Convert one Postgres value to JSON based on its declared type
fn pg_value(row: &PgRow, idx: usize) -> Result<Value> {
    let column = &row.columns()[idx];
    let name = column.name();

    let raw = row.try_get_raw(idx).map_err(|e| decode_err(name, e))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let type_name = column.type_info().name().to_uppercase();
    let value = match type_name.as_str() {
        "BOOL" => Value::Bool(row.try_get::<bool, _>(idx).map_err(|e| decode_err(name, e))?),
        "INT2" => Value::from(row.try_get::<i16, _>(idx).map_err(|e| decode_err(name, e))?),
        "INT4" => Value::from(row.try_get::<i32, _>(idx).map_err(|e| decode_err(name, e))?),
        "INT8" => Value::from(row.try_get::<i64, _>(idx).map_err(|e| decode_err(name, e))?),
        "FLOAT4" => float(row.try_get::<f32, _>(idx).map_err(|e| decode_err(name, e))? as f64),
        "FLOAT8" => float(row.try_get::<f64, _>(idx).map_err(|e| decode_err(name, e))?),
        "NUMERIC" => {
            let decimal = row
                .try_get::<rust_decimal::Decimal, _>(idx)
                .map_err(|e| decode_err(name, e))?;
            match decimal.to_f64() {
                Some(f) => float(f),
                None => Value::String(decimal.to_string()),
            }
        }
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx).map_err(|e| decode_err(name, e))?,
        "UUID" => Value::String(
            row.try_get::<uuid::Uuid, _>(idx)
                .map_err(|e| decode_err(name, e))?
                .to_string(),
        ),
        "DATE" => Value::String(
            row.try_get::<chrono::NaiveDate, _>(idx)
                .map_err(|e| decode_err(name, e))?
                .to_string(),
        ),
        "TIME" => Value::String(
            row.try_get::<chrono::NaiveTime, _>(idx)
                .map_err(|e| decode_err(name, e))?
                .to_string(),
        ),
        "TIMESTAMP" => Value::String(
            row.try_get::<chrono::NaiveDateTime, _>(idx)
                .map_err(|e| decode_err(name, e))?
                .to_string(),
        ),
        "TIMESTAMPTZ" => Value::String(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
                .map_err(|e| decode_err(name, e))?
                .to_rfc3339(),
        ),
        _ => match row.try_get::<String, _>(idx) {
            Ok(text) => Value::String(text),
            Err(_) => {
                debug!("Column {} has unsupported type {}, returning null", name, type_name);
                Value::Null
            }
        },
    };

    Ok(value)
}

fn float(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
