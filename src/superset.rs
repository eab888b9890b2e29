//! BI metadata source
//!
//! `MetadataSource` is the boundary to the BI tool; `SupersetClient` implements
//! it against the Superset REST API (`/api/v1`).

use crate::error::{InsightError, Result};
use crate::metadata::{Chart, Dashboard, DashboardMetadata, Dataset};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Read access to dashboard, chart and dataset metadata
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Dashboard with its charts and datasets
    async fn fetch_dashboard(&self, dashboard_id: i64) -> Result<DashboardMetadata>;

    /// Dataset details including columns and the connection descriptor
    async fn fetch_dataset(&self, dataset_id: i64) -> Result<Dataset>;

    /// SQL behind a chart, if the BI tool can render one
    async fn fetch_chart_sql(&self, chart_id: i64) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ChartSummary {
    id: i64,
    #[serde(default)]
    slice_name: Option<String>,
    #[serde(default)]
    viz_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    form_data: Option<serde_json::Value>,
}

impl ChartSummary {
    /// Dataset id from `form_data.datasource`, which looks like "12__table"
    fn dataset_id(&self) -> Option<i64> {
        let datasource = self.form_data.as_ref()?.get("datasource")?;
        match datasource {
            serde_json::Value::String(s) => s.split("__").next()?.parse().ok(),
            serde_json::Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    fn into_chart(self) -> Chart {
        let dataset_id = self.dataset_id();
        let viz_type = self.viz_type.clone().or_else(|| {
            self.form_data
                .as_ref()
                .and_then(|fd| fd.get("viz_type"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });
        Chart {
            id: self.id,
            name: self.slice_name,
            dataset_id,
            viz_type,
            description: self.description,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartQuery {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatabaseConnection {
    #[serde(default)]
    sqlalchemy_uri: Option<String>,
}

/// Superset 5.x REST client authenticated with a bearer token
pub struct SupersetClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupersetClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| InsightError::Config(format!("Failed to build Superset HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, target: &str) -> Result<T> {
        let url = format!("{}/api/v1/{}", self.base_url, endpoint.trim_start_matches('/'));
        debug!(%url, "Superset GET");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| InsightError::metadata_fetch(target, format!("Superset request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InsightError::metadata_fetch(
                target,
                format!("Superset API error [{}]: {}", status.as_u16(), body),
            ));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            InsightError::metadata_fetch(target, format!("Failed to parse Superset response: {}", e))
        })?;
        Ok(envelope.result)
    }
}

#[async_trait]
impl MetadataSource for SupersetClient {
    async fn fetch_dashboard(&self, dashboard_id: i64) -> Result<DashboardMetadata> {
        let target = format!("dashboard {}", dashboard_id);

        let dashboard: Dashboard = self.get(&format!("dashboard/{}", dashboard_id), &target).await?;
        let charts: Vec<ChartSummary> = self
            .get(&format!("dashboard/{}/charts", dashboard_id), &target)
            .await?;
        let datasets: Vec<Dataset> = self
            .get(&format!("dashboard/{}/datasets", dashboard_id), &target)
            .await?;

        Ok(DashboardMetadata {
            dashboard: Dashboard {
                id: dashboard.id.or(Some(dashboard_id)),
                ..dashboard
            },
            charts: charts.into_iter().map(ChartSummary::into_chart).collect(),
            datasets,
        })
    }

    async fn fetch_dataset(&self, dataset_id: i64) -> Result<Dataset> {
        let target = format!("dataset {}", dataset_id);
        let mut dataset: Dataset = self.get(&format!("dataset/{}", dataset_id), &target).await?;

        // The dataset payload usually carries only the database id.
        if dataset.connection_uri().is_none() {
            if let Some(database_id) = dataset.database.as_ref().and_then(|db| db.id) {
                let connection: DatabaseConnection = self
                    .get(&format!("database/{}/connection", database_id), &target)
                    .await?;
                if let Some(db) = dataset.database.as_mut() {
                    db.sqlalchemy_uri = connection.sqlalchemy_uri;
                }
            }
        }

        Ok(dataset)
    }

    async fn fetch_chart_sql(&self, chart_id: i64) -> Result<Option<String>> {
        let target = format!("chart {}", chart_id);
        let queries: Vec<ChartQuery> = self
            .get(&format!("chart/{}/data/?type=query&format=json", chart_id), &target)
            .await?;

        Ok(queries
            .into_iter()
            .filter_map(|q| q.query)
            .map(|q| q.trim().to_string())
            .find(|q| !q.is_empty()))
    }
}
