//! Vector Store Abstraction
//!
//! `VectorIndex` is the seam for nearest-neighbour search over embedded
//! documents. `ChromaIndex` talks to a Chroma server over HTTP; distance is
//! whatever the collection is configured with (squared L2 by default).

use crate::error::{InsightError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// One nearest-neighbour match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub id: String,
    pub text: String,
    pub distance: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite the document stored under `id`
    async fn upsert(&self, id: &str, text: &str, embedding: &[f32]) -> Result<()>;

    /// Up to `k` documents nearest to `embedding`
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievalHit>>;
}

/// Chroma collection accessed through its REST API
pub struct ChromaIndex {
    client: reqwest::Client,
    base_url: String,
    collection_id: String,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl ChromaIndex {
    /// Resolve (creating if needed) the collection named `collection`
    pub async fn connect(base_url: impl Into<String>, collection: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| InsightError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let body = serde_json::json!({ "name": collection, "get_or_create": true });
        let response = client
            .post(format!("{}/api/v1/collections", base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::Retrieval(format!("Vector store unreachable: {}", e)))?;
        let created: CollectionResponse = Self::read_json(response).await?;

        info!("Using vector collection {} ({})", collection, created.id);
        Ok(Self {
            client,
            base_url,
            collection_id: created.id,
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, action: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(format!(
                "{}/api/v1/collections/{}/{}",
                self.base_url, self.collection_id, action
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::Retrieval(format!("Vector store {} failed: {}", action, e)))?;
        Self::read_json(response).await
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InsightError::Retrieval(format!(
                "Vector store error ({}): {}",
                status, error_text
            )));
        }
        response
            .json()
            .await
            .map_err(|e| InsightError::Retrieval(format!("Failed to parse vector store response: {}", e)))
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn upsert(&self, id: &str, text: &str, embedding: &[f32]) -> Result<()> {
        let body = serde_json::json!({
            "ids": [id],
            "embeddings": [embedding],
            "documents": [text],
        });
        let _: serde_json::Value = self.post("upsert", body).await?;
        debug!("Upserted document {}", id);
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievalHit>> {
        let body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": k,
            "include": ["documents", "distances"],
        });
        let response: QueryResponse = self.post("query", body).await?;

        let ids = response.ids.into_iter().next().unwrap_or_default();
        let documents = response
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let distances = response
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        let hits = ids
            .into_iter()
            .enumerate()
            .map(|(idx, id)| RetrievalHit {
                id,
                text: documents.get(idx).cloned().flatten().unwrap_or_default(),
                distance: distances.get(idx).copied().flatten().unwrap_or(f32::MAX),
            })
            .collect();
        Ok(hits)
    }
}
