//! BI metadata model
//!
//! Snapshots of a dashboard, its charts and its datasets as returned by the BI
//! tool. Field aliases accept both the Superset REST names and the short names.

use serde::{Deserialize, Serialize};

/// Column type used when the BI tool reports none
pub const UNKNOWN_TYPE: &str = "UNKNOWN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    #[serde(alias = "column_name")]
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: Some(data_type.into()),
            description: None,
        }
    }

    /// Declared type, or "UNKNOWN"
    pub fn type_name(&self) -> &str {
        self.data_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(UNKNOWN_TYPE)
    }
}

/// Database reference attached to a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRef {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub database_name: Option<String>,
    /// Connection descriptor (SQLAlchemy-style URI)
    #[serde(default, skip_serializing)]
    pub sqlalchemy_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub database: Option<DatabaseRef>,
}

impl Dataset {
    pub fn new(id: i64, table_name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            id: Some(id),
            table_name: Some(table_name.into()),
            columns,
            ..Default::default()
        }
    }

    /// Table name, falling back to the dataset id
    pub fn effective_table_name(&self) -> Option<String> {
        self.table_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| self.id.map(|id| id.to_string()))
    }

    pub fn connection_uri(&self) -> Option<&str> {
        self.database
            .as_ref()
            .and_then(|db| db.sqlalchemy_uri.as_deref())
            .filter(|uri| !uri.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub id: i64,
    #[serde(default, alias = "slice_name")]
    pub name: Option<String>,
    #[serde(default, alias = "datasource_id")]
    pub dataset_id: Option<i64>,
    #[serde(default)]
    pub viz_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, alias = "dashboard_title")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A dashboard together with its charts and datasets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetadata {
    pub dashboard: Dashboard,
    #[serde(default)]
    pub charts: Vec<Chart>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
}

impl DashboardMetadata {
    pub fn dashboard_id(&self) -> Option<i64> {
        self.dashboard.id
    }
}
