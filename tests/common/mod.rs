//! Test doubles shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use dashboard_insights::cache::{CacheStore, MemoryCache};
use dashboard_insights::error::{InsightError, Result};
use dashboard_insights::execution::{ConnectionTarget, DriverEngine, ExecutionResult, QueryEngine, Row};
use dashboard_insights::llm::TextGenerator;
use dashboard_insights::metadata::{Chart, Column, Dashboard, DashboardMetadata, DatabaseRef, Dataset};
use dashboard_insights::pipeline::Capabilities;
use dashboard_insights::schema_rag::{Embedder, RetrievalHit, VectorIndex};
use dashboard_insights::superset::MetadataSource;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Superset stand-in backed by fixed metadata
#[derive(Default)]
pub struct FakeSuperset {
    pub dashboards: HashMap<i64, DashboardMetadata>,
    pub datasets: HashMap<i64, Dataset>,
    pub chart_sql: HashMap<i64, String>,
}

#[async_trait]
impl MetadataSource for FakeSuperset {
    async fn fetch_dashboard(&self, dashboard_id: i64) -> Result<DashboardMetadata> {
        self.dashboards.get(&dashboard_id).cloned().ok_or_else(|| {
            InsightError::metadata_fetch(
                format!("dashboard {}", dashboard_id),
                "Superset API error [404]: {\"message\":\"Not found\"}",
            )
        })
    }

    async fn fetch_dataset(&self, dataset_id: i64) -> Result<Dataset> {
        self.datasets.get(&dataset_id).cloned().ok_or_else(|| {
            InsightError::metadata_fetch(format!("dataset {}", dataset_id), "Superset API error [404]")
        })
    }

    async fn fetch_chart_sql(&self, chart_id: i64) -> Result<Option<String>> {
        Ok(self.chart_sql.get(&chart_id).cloned())
    }
}

/// Deterministic bag-of-letters embedding
pub struct LetterEmbedder;

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut counts = vec![0.0f32; 26];
        for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
            counts[(c as u8 - b'a') as usize] += 1.0;
        }
        Ok(counts)
    }
}

/// In-process vector index ranked by squared L2 distance
#[derive(Default)]
pub struct MemoryIndex {
    documents: RwLock<Vec<(String, String, Vec<f32>)>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    pub fn text(&self, id: &str) -> Option<String> {
        let docs = self.documents.read().unwrap();
        docs.iter().find(|(doc_id, _, _)| doc_id == id).map(|(_, text, _)| text.clone())
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, id: &str, text: &str, embedding: &[f32]) -> Result<()> {
        let mut docs = self.documents.write().unwrap();
        let stored = (id.to_string(), text.to_string(), embedding.to_vec());
        match docs.iter_mut().find(|(doc_id, _, _)| doc_id == id) {
            Some(existing) => *existing = stored,
            None => docs.push(stored),
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievalHit>> {
        let docs = self.documents.read().unwrap();
        let mut hits: Vec<RetrievalHit> = docs
            .iter()
            .map(|(id, text, stored)| RetrievalHit {
                id: id.clone(),
                text: text.clone(),
                distance: stored.iter().zip(embedding).map(|(a, b)| (a - b) * (a - b)).sum(),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }
}

/// Replies with a fixed response and remembers every prompt
pub struct ScriptedLlm {
    response: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for ScriptedLlm {
    async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.response.clone())
    }
}

/// Returns one canned row and records every statement it is given
#[derive(Default)]
pub struct RecordingEngine {
    pub statements: Mutex<Vec<String>>,
}

impl RecordingEngine {
    pub fn calls(&self) -> usize {
        self.statements.lock().unwrap().len()
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryEngine for RecordingEngine {
    async fn fetch_rows(
        &self,
        _target: &ConnectionTarget,
        sql: &str,
        _timeout: Duration,
    ) -> Result<ExecutionResult> {
        self.statements.lock().unwrap().push(sql.to_string());
        let mut row = Row::new();
        row.insert("value".to_string(), serde_json::json!(1));
        Ok(ExecutionResult::new(vec!["value".to_string()], vec![row]))
    }
}

/// Wraps the real driver engine and records what reaches it
#[derive(Default)]
pub struct TracingEngine {
    inner: DriverEngine,
    pub statements: Mutex<Vec<String>>,
}

impl TracingEngine {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryEngine for TracingEngine {
    async fn fetch_rows(
        &self,
        target: &ConnectionTarget,
        sql: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        self.statements.lock().unwrap().push(sql.to_string());
        self.inner.fetch_rows(target, sql, timeout).await
    }
}

/// Cache whose every operation fails
pub struct BrokenCache;

#[async_trait]
impl CacheStore for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(InsightError::Cache("cache offline".to_string()))
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
        Err(InsightError::Cache("cache offline".to_string()))
    }

    async fn purge_expired(&self) -> Result<usize> {
        Err(InsightError::Cache("cache offline".to_string()))
    }
}

/// A scratch SQLite database with `orders` and `customers`
pub struct SalesDb {
    pub path: PathBuf,
}

impl SalesDb {
    pub fn create() -> Self {
        let path = std::env::temp_dir().join(format!("insights-sales-{}.db", uuid::Uuid::new_v4()));
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE customers (customer_id INTEGER, name TEXT, region TEXT);
             INSERT INTO customers VALUES (1, 'Acme', 'east'), (2, 'Globex', 'west');
             CREATE TABLE orders (order_id INTEGER, customer_id INTEGER, amount REAL);
             INSERT INTO orders VALUES (10, 1, 120.0), (11, 1, 80.0), (12, 2, 50.0);",
        )
        .unwrap();
        Self { path }
    }

    pub fn uri(&self) -> String {
        format!("sqlite:///{}", self.path.display())
    }

    pub fn order_count(&self) -> i64 {
        let conn = rusqlite::Connection::open(&self.path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
            .unwrap()
    }
}

impl Drop for SalesDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Dashboard 7 with two charts over `orders` and `customers`
pub fn sales_superset(uri: Option<String>) -> FakeSuperset {
    let database = uri.map(|uri| DatabaseRef {
        id: Some(1),
        database_name: Some("sales".to_string()),
        sqlalchemy_uri: Some(uri),
    });

    let mut orders = Dataset::new(
        21,
        "orders",
        vec![
            Column::new("order_id", "INTEGER"),
            Column::new("customer_id", "INTEGER"),
            Column::new("amount", "REAL"),
        ],
    );
    orders.database = database.clone();

    let mut customers = Dataset::new(
        22,
        "customers",
        vec![
            Column::new("customer_id", "INTEGER"),
            Column::new("name", "TEXT"),
            Column::new("region", "TEXT"),
        ],
    );
    customers.database = database;

    let listed = |d: &Dataset| Dataset {
        id: d.id,
        table_name: d.table_name.clone(),
        ..Default::default()
    };

    let metadata = DashboardMetadata {
        dashboard: Dashboard {
            id: Some(7),
            name: Some("Sales overview".to_string()),
            description: Some("Revenue by customer".to_string()),
        },
        charts: vec![
            Chart {
                id: 31,
                name: Some("Revenue".to_string()),
                dataset_id: Some(21),
                viz_type: Some("big_number".to_string()),
                description: None,
            },
            Chart {
                id: 32,
                name: Some("Customers by region".to_string()),
                dataset_id: Some(22),
                viz_type: Some("pie".to_string()),
                description: None,
            },
        ],
        datasets: vec![listed(&orders), listed(&customers)],
    };

    let mut superset = FakeSuperset::default();
    superset.dashboards.insert(7, metadata);
    superset.datasets.insert(21, orders);
    superset.datasets.insert(22, customers);
    superset
        .chart_sql
        .insert(31, "SELECT SUM(amount) FROM orders".to_string());
    superset
}

pub struct Harness {
    pub capabilities: Capabilities,
    pub llm: Arc<ScriptedLlm>,
    pub engine: Arc<TracingEngine>,
    pub index: Arc<MemoryIndex>,
}

pub fn harness(superset: FakeSuperset, llm_response: &str) -> Harness {
    let llm = Arc::new(ScriptedLlm::new(llm_response));
    let engine = Arc::new(TracingEngine::default());
    let index = Arc::new(MemoryIndex::new());

    let capabilities = Capabilities {
        metadata: Arc::new(superset),
        embedder: Arc::new(LetterEmbedder),
        index: index.clone(),
        llm: llm.clone(),
        engine: engine.clone(),
        cache: Arc::new(MemoryCache::new()),
    };

    Harness {
        capabilities,
        llm,
        engine,
        index,
    }
}
