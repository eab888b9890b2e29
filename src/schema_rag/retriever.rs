//! Schema RAG Retriever
//!
//! Embeds training documents into the vector index and answers k-nearest
//! queries with hits ranked by ascending distance.

use crate::documents::TrainingDocument;
use crate::error::{InsightError, Result};
use crate::schema_rag::embedder::Embedder;
use crate::schema_rag::vector_store::{RetrievalHit, VectorIndex};
use std::sync::Arc;
use tracing::debug;

/// Retrieval index adapter over an embedder and a vector index
#[derive(Clone)]
pub struct RetrievalIndex {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl RetrievalIndex {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Embed `doc` and upsert it by id, returning it with the embedding filled in
    pub async fn ingest(&self, mut doc: TrainingDocument) -> Result<TrainingDocument> {
        let embedding = self.embedder.embed(&doc.text).await?;
        self.index.upsert(&doc.id, &doc.text, &embedding).await?;
        debug!("Ingested {} ({} dims)", doc.id, embedding.len());
        doc.embedding = embedding;
        Ok(doc)
    }

    /// The `k` documents nearest to `text`, closest first
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievalHit>> {
        if k == 0 {
            return Err(InsightError::Retrieval(
                "number of results must be at least 1".to_string(),
            ));
        }

        let embedding = self.embedder.embed(text).await?;
        let mut hits = self.index.query(&embedding, k).await?;
        // stable: ties keep index order
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_rag::embedder::Embedding;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Embeds text as (length, count of 'a')
    #[derive(Default)]
    struct LengthEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, text.matches('a').count() as f32])
        }
    }

    /// Returns canned hits out of order
    struct CannedIndex;

    #[async_trait]
    impl VectorIndex for CannedIndex {
        async fn upsert(&self, _id: &str, _text: &str, _embedding: &[f32]) -> Result<()> {
            Ok(())
        }

        async fn query(&self, _embedding: &[f32], _k: usize) -> Result<Vec<RetrievalHit>> {
            let hit = |id: &str, distance| RetrievalHit {
                id: id.to_string(),
                text: id.to_string(),
                distance,
            };
            Ok(vec![hit("b", 2.0), hit("first-tie", 1.0), hit("second-tie", 1.0)])
        }
    }

    /// Keeps one text per id and returns every stored document
    #[derive(Default)]
    struct KeyedIndex {
        docs: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl VectorIndex for KeyedIndex {
        async fn upsert(&self, id: &str, text: &str, _embedding: &[f32]) -> Result<()> {
            let mut docs = self.docs.lock().unwrap();
            docs.retain(|(existing, _)| existing != id);
            docs.push((id.to_string(), text.to_string()));
            Ok(())
        }

        async fn query(&self, _embedding: &[f32], k: usize) -> Result<Vec<RetrievalHit>> {
            let docs = self.docs.lock().unwrap();
            Ok(docs
                .iter()
                .take(k)
                .map(|(id, text)| RetrievalHit {
                    id: id.clone(),
                    text: text.clone(),
                    distance: 0.0,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_ingest_embeds_once_and_fills_embedding() {
        let embedder = Arc::new(LengthEmbedder::default());
        let retrieval = RetrievalIndex::new(embedder.clone(), Arc::new(KeyedIndex::default()));

        let doc = retrieval
            .ingest(TrainingDocument::new("chart-1", "aaa"))
            .await
            .unwrap();
        assert_eq!(doc.embedding, vec![3.0, 3.0]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reingest_keeps_latest_text() {
        let retrieval = RetrievalIndex::new(Arc::new(LengthEmbedder::default()), Arc::new(KeyedIndex::default()));

        retrieval.ingest(TrainingDocument::new("chart-1", "first")).await.unwrap();
        retrieval.ingest(TrainingDocument::new("chart-1", "second")).await.unwrap();

        let hits = retrieval.query("second", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "second");
    }

    #[tokio::test]
    async fn test_query_sorts_stably() {
        let retrieval = RetrievalIndex::new(Arc::new(LengthEmbedder::default()), Arc::new(CannedIndex));
        let hits = retrieval.query("anything", 3).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["first-tie", "second-tie", "b"]);
    }

    #[tokio::test]
    async fn test_zero_k_is_an_error() {
        let retrieval = RetrievalIndex::new(Arc::new(LengthEmbedder::default()), Arc::new(KeyedIndex::default()));
        assert!(matches!(
            retrieval.query("x", 0).await,
            Err(InsightError::Retrieval(_))
        ));
    }
}
