//! Insight pipeline
//!
//! Per request: fetch metadata, build the training pack, ingest documents,
//! generate, validate, execute. Every step is awaited in order and any
//! failure ends the request. Generated SQL reaches the executor only after
//! the guard has accepted it.

use crate::cache::{CacheStore, SqliteCache};
use crate::config::Settings;
use crate::documents::build_training_documents;
use crate::error::{InsightError, Result};
use crate::execution::{DriverEngine, QueryEngine, QueryExecutor, Row};
use crate::generator::InsightGenerator;
use crate::llm::{OpenAiGenerator, TextGenerator};
use crate::metadata::DashboardMetadata;
use crate::schema_rag::{ChromaIndex, Embedder, OpenAiEmbedder, RetrievalIndex, VectorIndex};
use crate::sql_guard::{self, ValidationVerdict};
use crate::superset::{MetadataSource, SupersetClient};
use crate::training_pack::{TrainingPack, TrainingPackBuilder};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// External collaborators shared by every request
#[derive(Clone)]
pub struct Capabilities {
    pub metadata: Arc<dyn MetadataSource>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub llm: Arc<dyn TextGenerator>,
    pub engine: Arc<dyn QueryEngine>,
    pub cache: Arc<dyn CacheStore>,
}

impl Capabilities {
    /// Connect the production adapters described by `settings`
    pub async fn init(settings: &Settings) -> Result<Self> {
        let metadata = SupersetClient::new(&settings.superset_base_url, &settings.superset_api_key)?;
        let embedder = OpenAiEmbedder::new(
            &settings.llm_api_key,
            &settings.llm_base_url,
            &settings.embedding_model,
        )?;
        let llm = OpenAiGenerator::new(
            &settings.llm_api_key,
            &settings.llm_base_url,
            &settings.llm_model,
        )?;
        let index = ChromaIndex::connect(&settings.vector_store_url, &settings.vector_store_collection).await?;
        let cache = SqliteCache::open(&settings.cache_path)?;

        info!("Capabilities initialized (model {})", settings.llm_model);
        Ok(Self {
            metadata: Arc::new(metadata),
            embedder: Arc::new(embedder),
            index: Arc::new(index),
            llm: Arc::new(llm),
            engine: Arc::new(DriverEngine::new()),
            cache: Arc::new(cache),
        })
    }

    /// Release what can be released before exit
    pub async fn shutdown(&self) {
        match self.cache.purge_expired().await {
            Ok(purged) => info!("Purged {} expired cache entries", purged),
            Err(e) => warn!("Cache purge on shutdown failed: {}", e),
        }
    }
}

/// Per-request limits and fallbacks
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub row_limit: u64,
    pub statement_timeout: Duration,
    pub cache_ttl: Duration,
    pub max_tokens: u32,
    pub default_target: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            row_limit: 50,
            statement_timeout: Duration::from_secs(15),
            cache_ttl: crate::cache::DEFAULT_TTL,
            max_tokens: 1024,
            default_target: None,
        }
    }
}

impl From<&Settings> for PipelineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            row_limit: settings.row_limit,
            statement_timeout: settings.statement_timeout,
            cache_ttl: settings.cache_ttl,
            max_tokens: settings.llm_max_tokens,
            default_target: settings.default_database_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightResponse {
    pub dashboard_id: i64,
    pub sql: String,
    pub insight: String,
    /// Relations the SQL reads, best effort
    pub tables: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub dashboard_id: i64,
    /// Ids of the documents written to the index
    pub documents: Vec<String>,
}

pub struct InsightPipeline {
    metadata: Arc<dyn MetadataSource>,
    retrieval: RetrievalIndex,
    generator: InsightGenerator,
    executor: Arc<QueryExecutor>,
    builder: TrainingPackBuilder,
    options: PipelineOptions,
}

impl InsightPipeline {
    pub fn new(capabilities: &Capabilities, options: PipelineOptions) -> Self {
        let retrieval = RetrievalIndex::new(capabilities.embedder.clone(), capabilities.index.clone());
        let executor = Arc::new(
            QueryExecutor::new(capabilities.engine.clone(), capabilities.cache.clone())
                .with_cache_ttl(options.cache_ttl),
        );
        let builder = TrainingPackBuilder::new(
            capabilities.metadata.clone(),
            executor.clone(),
            options.default_target.clone(),
            options.statement_timeout,
        );
        let generator = InsightGenerator::new(retrieval.clone(), capabilities.llm.clone(), options.max_tokens);

        Self {
            metadata: capabilities.metadata.clone(),
            retrieval,
            generator,
            executor,
            builder,
            options,
        }
    }

    /// Generate, validate and execute an insight query for a dashboard
    pub async fn run(&self, dashboard_id: i64, question: Option<&str>) -> Result<InsightResponse> {
        info!("Generating insights for dashboard {}", dashboard_id);
        let metadata = self.fetch_metadata(dashboard_id).await?;
        let (pack, _) = self.ingest(&metadata).await?;

        let generated = self.generator.generate(&metadata, question).await?;
        sql_guard::validate(&generated.sql).into_result()?;

        let target = pack
            .execution_target()
            .or(self.options.default_target.as_deref())
            .ok_or_else(|| {
                InsightError::Execution("no dataset with a database connection found".to_string())
            })?;

        let result = self
            .executor
            .execute(
                &generated.sql,
                target,
                self.options.row_limit,
                self.options.statement_timeout,
            )
            .await?;
        info!("Dashboard {} query returned {} rows", dashboard_id, result.len());

        Ok(InsightResponse {
            dashboard_id,
            tables: sql_guard::referenced_tables(&generated.sql),
            sql: generated.sql,
            insight: generated.insight,
            rows: result.rows,
        })
    }

    /// Refresh the index with a dashboard's documents without generating
    pub async fn ingest_dashboard(&self, dashboard_id: i64) -> Result<IngestReport> {
        let metadata = self.fetch_metadata(dashboard_id).await?;
        let (_, documents) = self.ingest(&metadata).await?;
        info!("Ingested {} documents for dashboard {}", documents.len(), dashboard_id);
        Ok(IngestReport {
            dashboard_id,
            documents,
        })
    }

    pub fn validate(&self, sql: &str) -> ValidationVerdict {
        sql_guard::validate(sql)
    }

    async fn fetch_metadata(&self, dashboard_id: i64) -> Result<DashboardMetadata> {
        let mut metadata = self.metadata.fetch_dashboard(dashboard_id).await?;
        if metadata.dashboard.id.is_none() {
            metadata.dashboard.id = Some(dashboard_id);
        }
        Ok(metadata)
    }

    async fn ingest(&self, metadata: &DashboardMetadata) -> Result<(TrainingPack, Vec<String>)> {
        let pack = self.builder.build(metadata).await?;
        let mut ids = Vec::new();
        for doc in build_training_documents(metadata, &pack) {
            let doc = self.retrieval.ingest(doc).await?;
            ids.push(doc.id);
        }
        Ok((pack, ids))
    }
}
