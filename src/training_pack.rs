//! Training Context Builder
//!
//! Collects everything the generator may be shown about a dashboard: chart
//! SQL, pseudo-DDL for each dataset, a few sample rows, candidate joins and
//! the connection each dataset lives on.

use crate::error::Result;
use crate::execution::{QueryExecutor, Row};
use crate::metadata::{Column, DashboardMetadata, Dataset};
use crate::schema_analyzer::{self, JoinEdge};
use crate::sql_guard;
use crate::superset::MetadataSource;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rows fetched per dataset for the sample
pub const SAMPLE_ROW_LIMIT: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSql {
    pub chart_id: i64,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRows {
    pub dataset_id: i64,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetConnection {
    pub dataset_id: i64,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingPack {
    pub ddl: Vec<String>,
    pub joins: Vec<JoinEdge>,
    pub chart_sqls: Vec<ChartSql>,
    pub sample_rows: Vec<SampleRows>,
    pub connections: Vec<DatasetConnection>,
    /// Dataset details as resolved during the build, in dashboard order
    pub datasets: Vec<Dataset>,
}

impl TrainingPack {
    /// Connection of the first dataset that has one
    pub fn execution_target(&self) -> Option<&str> {
        self.connections.first().map(|c| c.uri.as_str())
    }

    pub fn chart_sql(&self, chart_id: i64) -> Option<&str> {
        self.chart_sqls
            .iter()
            .find(|c| c.chart_id == chart_id)
            .map(|c| c.sql.as_str())
    }

    pub fn sample_rows(&self, dataset_id: i64) -> &[Row] {
        self.sample_rows
            .iter()
            .find(|s| s.dataset_id == dataset_id)
            .map(|s| s.rows.as_slice())
            .unwrap_or(&[])
    }
}

/// Render `TABLE name (\n  col type,\n  ...\n)`
pub fn render_ddl(table: &str, columns: &[Column]) -> String {
    let body = columns
        .iter()
        .map(|c| format!("  {} {}", c.name, c.type_name()))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("TABLE {} (\n{}\n)", table, body)
}

pub struct TrainingPackBuilder {
    source: Arc<dyn MetadataSource>,
    executor: Arc<QueryExecutor>,
    default_target: Option<String>,
    statement_timeout: Duration,
}

impl TrainingPackBuilder {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        executor: Arc<QueryExecutor>,
        default_target: Option<String>,
        statement_timeout: Duration,
    ) -> Self {
        Self {
            source,
            executor,
            default_target,
            statement_timeout,
        }
    }

    /// Build the pack for one dashboard.
    ///
    /// Chart and dataset fetch failures propagate. Sample-row failures only
    /// leave that dataset's rows empty.
    pub async fn build(&self, metadata: &DashboardMetadata) -> Result<TrainingPack> {
        let mut pack = TrainingPack::default();

        for chart in &metadata.charts {
            let sql = self.source.fetch_chart_sql(chart.id).await?;
            if let Some(sql) = sql.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
                pack.chart_sqls.push(ChartSql {
                    chart_id: chart.id,
                    sql,
                });
            }
        }

        for listed in &metadata.datasets {
            let Some(dataset_id) = listed.id else {
                debug!("Skipping dataset without an id");
                continue;
            };

            let details = self.source.fetch_dataset(dataset_id).await?;
            let fetched_columns = !details.columns.is_empty();
            let dataset = merge_dataset(dataset_id, listed, details);
            let table = dataset
                .effective_table_name()
                .unwrap_or_else(|| dataset_id.to_string());

            if let Some(uri) = dataset.connection_uri() {
                pack.connections.push(DatasetConnection {
                    dataset_id,
                    uri: uri.to_string(),
                });
            }

            if fetched_columns {
                pack.ddl.push(render_ddl(&table, &dataset.columns));

                let target = dataset
                    .connection_uri()
                    .map(str::to_string)
                    .or_else(|| self.default_target.clone());
                let rows = self
                    .fetch_sample_rows(&qualified_name(&dataset, &table), target.as_deref())
                    .await;
                pack.sample_rows.push(SampleRows { dataset_id, rows });
            }

            pack.datasets.push(dataset);
        }

        pack.joins = schema_analyzer::analyze(&pack.datasets).joins;

        info!(
            "Training pack: {} DDL, {} chart SQL, {} joins, {} connections",
            pack.ddl.len(),
            pack.chart_sqls.len(),
            pack.joins.len(),
            pack.connections.len()
        );
        Ok(pack)
    }

    async fn fetch_sample_rows(&self, table: &str, target: Option<&str>) -> Vec<Row> {
        let Some(target) = target else {
            debug!("No connection for {}, skipping sample rows", table);
            return Vec::new();
        };

        let sql = format!("SELECT * FROM {} LIMIT {}", table, SAMPLE_ROW_LIMIT);
        let verdict = sql_guard::validate(&sql);
        if !verdict.valid {
            warn!("Sample query for {} rejected: {}", table, verdict.reason);
            return Vec::new();
        }

        match self
            .executor
            .execute(&sql, target, SAMPLE_ROW_LIMIT, self.statement_timeout)
            .await
        {
            Ok(result) => result.rows,
            Err(e) => {
                warn!("Sample rows for {} unavailable: {}", table, e);
                Vec::new()
            }
        }
    }
}

/// Fetched details win; gaps are filled from the dashboard listing
fn merge_dataset(dataset_id: i64, listed: &Dataset, mut details: Dataset) -> Dataset {
    details.id = Some(dataset_id);
    if details.table_name.as_deref().map(str::trim).unwrap_or("").is_empty() {
        details.table_name = listed.table_name.clone();
    }
    if details.schema.is_none() {
        details.schema = listed.schema.clone();
    }
    if details.description.is_none() {
        details.description = listed.description.clone();
    }
    if details.columns.is_empty() {
        details.columns = listed.columns.clone();
    }
    if details.connection_uri().is_none() && listed.connection_uri().is_some() {
        details.database = listed.database.clone();
    }
    details
}

fn qualified_name(dataset: &Dataset, table: &str) -> String {
    match dataset.schema.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(schema) => format!("{}.{}", schema, table),
        None => table.to_string(),
    }
}
