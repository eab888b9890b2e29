//! Training documents
//!
//! Text renderings of a dashboard, its charts and its datasets, ready to be
//! embedded. Ids are stable (`dashboard-<id>`, `chart-<id>`, `dataset-<id>`)
//! so re-ingesting a dashboard overwrites its previous documents. Connection
//! descriptors ride along on dataset documents but never enter the text.

use crate::metadata::{Chart, DashboardMetadata, Dataset};
use crate::training_pack::{render_ddl, TrainingPack};
use std::fmt::Write;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingDocument {
    pub id: String,
    pub text: String,
    /// Filled in by ingestion
    pub embedding: Vec<f32>,
    pub execution_uri: Option<String>,
}

impl TrainingDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_execution_uri(mut self, uri: Option<String>) -> Self {
        self.execution_uri = uri;
        self
    }
}

/// Documents for one dashboard: summary first, then charts, then datasets
pub fn build_training_documents(
    metadata: &DashboardMetadata,
    pack: &TrainingPack,
) -> Vec<TrainingDocument> {
    let mut docs = Vec::with_capacity(1 + metadata.charts.len() + pack.datasets.len());

    if let Some(dashboard_id) = metadata.dashboard_id() {
        docs.push(TrainingDocument::new(
            format!("dashboard-{}", dashboard_id),
            dashboard_text(dashboard_id, metadata, pack),
        ));
    }

    for chart in &metadata.charts {
        docs.push(TrainingDocument::new(
            format!("chart-{}", chart.id),
            chart_text(chart, metadata, pack),
        ));
    }

    for dataset in &pack.datasets {
        let Some(dataset_id) = dataset.id else { continue };
        docs.push(
            TrainingDocument::new(format!("dataset-{}", dataset_id), dataset_text(dataset_id, dataset, pack))
                .with_execution_uri(dataset.connection_uri().map(str::to_string)),
        );
    }

    docs
}

fn dashboard_text(dashboard_id: i64, metadata: &DashboardMetadata, pack: &TrainingPack) -> String {
    let mut text = format!(
        "Dashboard {}: {}\n",
        dashboard_id,
        metadata.dashboard.name.as_deref().unwrap_or("untitled")
    );
    if let Some(description) = non_empty(&metadata.dashboard.description) {
        let _ = writeln!(text, "Description: {}", description);
    }

    if !metadata.charts.is_empty() {
        let charts = metadata
            .charts
            .iter()
            .map(|c| match non_empty(&c.name) {
                Some(name) => format!("{} ({})", c.id, name),
                None => c.id.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(text, "Charts: {}", charts);
    }

    let tables: Vec<String> = pack
        .datasets
        .iter()
        .filter_map(Dataset::effective_table_name)
        .collect();
    if !tables.is_empty() {
        let _ = writeln!(text, "Tables: {}", tables.join(", "));
    }

    if !pack.joins.is_empty() {
        let _ = writeln!(text, "Join hints (shared column names, not verified foreign keys):");
        for join in &pack.joins {
            let _ = writeln!(
                text,
                "  {}.{} = {}.{}",
                join.left_table, join.column, join.right_table, join.column
            );
        }
    }

    text.trim_end().to_string()
}

fn chart_text(chart: &Chart, metadata: &DashboardMetadata, pack: &TrainingPack) -> String {
    let mut text = format!(
        "Chart {}: {}\n",
        chart.id,
        chart.name.as_deref().unwrap_or("untitled")
    );
    if let Some(viz) = non_empty(&chart.viz_type) {
        let _ = writeln!(text, "Visualization: {}", viz);
    }
    if let Some(dataset_id) = chart.dataset_id {
        let table = pack
            .datasets
            .iter()
            .chain(metadata.datasets.iter())
            .find(|d| d.id == Some(dataset_id))
            .and_then(Dataset::effective_table_name)
            .unwrap_or_else(|| dataset_id.to_string());
        let _ = writeln!(text, "Dataset: {}", table);
    }
    if let Some(description) = non_empty(&chart.description) {
        let _ = writeln!(text, "Description: {}", description);
    }
    if let Some(sql) = pack.chart_sql(chart.id) {
        let _ = writeln!(text, "Query:\n{}", sql);
    }
    text.trim_end().to_string()
}

fn dataset_text(dataset_id: i64, dataset: &Dataset, pack: &TrainingPack) -> String {
    let table = dataset
        .effective_table_name()
        .unwrap_or_else(|| dataset_id.to_string());

    let mut text = format!("Dataset {}: {}\n", dataset_id, table);
    if let Some(schema) = non_empty(&dataset.schema) {
        let _ = writeln!(text, "Schema: {}", schema);
    }
    if let Some(description) = non_empty(&dataset.description) {
        let _ = writeln!(text, "Description: {}", description);
    }
    if !dataset.columns.is_empty() {
        let _ = writeln!(text, "{}", render_ddl(&table, &dataset.columns));
    }

    let rows = pack.sample_rows(dataset_id);
    if !rows.is_empty() {
        let _ = writeln!(text, "Sample rows:");
        for row in rows {
            let _ = writeln!(text, "  {}", serde_json::Value::Object(row.clone()));
        }
    }
    text.trim_end().to_string()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
