//! Insight Generator
//!
//! RETRIEVE context for the dashboard, PROMPT, GENERATE, then PARSE the
//! response into SQL and insight text. The SQL is untrusted until it has
//! passed the SQL guard.

use crate::error::{InsightError, Result};
use crate::llm::TextGenerator;
use crate::metadata::DashboardMetadata;
use crate::prompts::{build_insight_prompt, INSIGHT_MARKER, SQL_MARKER};
use crate::schema_rag::RetrievalIndex;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Documents retrieved per generation
pub const RETRIEVAL_K: usize = 5;

/// Insight used when the response lacks the expected markers
pub const INSIGHT_FALLBACK: &str = "Insight could not be extracted.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedInsight {
    pub sql: String,
    pub insight: String,
}

pub struct InsightGenerator {
    retrieval: RetrievalIndex,
    llm: Arc<dyn TextGenerator>,
    max_tokens: u32,
}

impl InsightGenerator {
    pub fn new(retrieval: RetrievalIndex, llm: Arc<dyn TextGenerator>, max_tokens: u32) -> Self {
        Self {
            retrieval,
            llm,
            max_tokens,
        }
    }

    pub async fn generate(
        &self,
        metadata: &DashboardMetadata,
        question: Option<&str>,
    ) -> Result<GeneratedInsight> {
        let dashboard_id = metadata.dashboard_id().ok_or_else(|| {
            InsightError::Generation("Dashboard metadata missing 'id'".to_string())
        })?;

        let hits = self
            .retrieval
            .query(&retrieval_query(dashboard_id), RETRIEVAL_K)
            .await?;
        let context = hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        info!("Generating insight for dashboard {} from {} documents", dashboard_id, hits.len());

        let prompt = build_insight_prompt(&context, question);
        let response = self.llm.generate(&prompt, self.max_tokens).await?;
        Ok(parse_generation(&response))
    }
}

pub fn retrieval_query(dashboard_id: i64) -> String {
    format!("Generate SQL and insight for dashboard {}", dashboard_id)
}

/// Split a response into SQL and insight. Never fails.
///
/// Both markers must be present with `Insight:` after the first `SQL:`;
/// otherwise the whole response is taken as SQL and the insight falls back.
/// A surrounding code fence is dropped from the SQL either way.
pub fn parse_generation(text: &str) -> GeneratedInsight {
    if let Some(sql_at) = text.find(SQL_MARKER) {
        let sql_start = sql_at + SQL_MARKER.len();
        if let Some(offset) = text[sql_start..].find(INSIGHT_MARKER) {
            let insight_at = sql_start + offset;
            return GeneratedInsight {
                sql: strip_code_fence(text[sql_start..insight_at].trim()),
                insight: text[insight_at + INSIGHT_MARKER.len()..].trim().to_string(),
            };
        }
    }

    GeneratedInsight {
        sql: strip_code_fence(text.trim()),
        insight: INSIGHT_FALLBACK.to_string(),
    }
}

/// Drop a surrounding ```sql fence
fn strip_code_fence(sql: &str) -> String {
    let Some(inner) = sql.strip_prefix("```").and_then(|s| s.strip_suffix("```")) else {
        return sql.to_string();
    };
    let inner = match inner.split_once('\n') {
        Some((lang, rest)) if !lang.trim().contains(' ') => rest,
        _ => inner,
    };
    inner.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_rag::{Embedder, RetrievalHit, VectorIndex};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    /// Remembers the requested k and returns three documents, closest first
    #[derive(Default)]
    struct RecordingIndex {
        requested_k: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn upsert(&self, _id: &str, _text: &str, _embedding: &[f32]) -> Result<()> {
            Ok(())
        }

        async fn query(&self, _embedding: &[f32], k: usize) -> Result<Vec<RetrievalHit>> {
            *self.requested_k.lock().unwrap() = Some(k);
            Ok(["a", "b", "c"]
                .iter()
                .enumerate()
                .map(|(rank, text)| RetrievalHit {
                    id: format!("doc-{}", text),
                    text: text.to_string(),
                    distance: rank as f32,
                })
                .collect())
        }
    }

    /// Counts calls; fails when no reply is configured
    #[derive(Default)]
    struct StubLlm {
        reply: Option<String>,
        calls: AtomicUsize,
        prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl TextGenerator for StubLlm {
        async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.prompt.lock().unwrap() = Some(prompt.to_string());
            self.reply
                .clone()
                .ok_or_else(|| InsightError::Generation("LLM API error (503): overloaded".to_string()))
        }
    }

    fn generator(index: Arc<RecordingIndex>, llm: Arc<StubLlm>) -> InsightGenerator {
        let retrieval = RetrievalIndex::new(Arc::new(FixedEmbedder), index);
        InsightGenerator::new(retrieval, llm, 300)
    }

    fn dashboard(id: Option<i64>) -> DashboardMetadata {
        let mut metadata = DashboardMetadata::default();
        metadata.dashboard.id = id;
        metadata
    }

    #[tokio::test]
    async fn test_generate_without_dashboard_id() {
        let llm = Arc::new(StubLlm::default());
        let err = generator(Arc::new(RecordingIndex::default()), llm.clone())
            .generate(&dashboard(None), None)
            .await
            .unwrap_err();

        assert!(matches!(err, InsightError::Generation(ref msg) if msg.contains("missing 'id'")));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_llm_failure_is_a_generation_error() {
        let llm = Arc::new(StubLlm::default());
        let err = generator(Arc::new(RecordingIndex::default()), llm.clone())
            .generate(&dashboard(Some(3)), None)
            .await
            .unwrap_err();

        assert!(matches!(err, InsightError::Generation(_)));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generate_retrieves_five_and_joins_context() {
        let index = Arc::new(RecordingIndex::default());
        let llm = Arc::new(StubLlm {
            reply: Some("SQL:\nSELECT 1 LIMIT 1\nInsight:\nOne.".to_string()),
            ..Default::default()
        });

        let generated = generator(index.clone(), llm.clone())
            .generate(&dashboard(Some(3)), Some("How many?"))
            .await
            .unwrap();

        assert_eq!(*index.requested_k.lock().unwrap(), Some(RETRIEVAL_K));
        assert_eq!(RETRIEVAL_K, 5);
        let prompt = llm.prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Context:\na\nb\nc\n"));
        assert!(prompt.contains("How many?"));
        assert_eq!(generated.sql, "SELECT 1 LIMIT 1");
        assert_eq!(generated.insight, "One.");
    }

    #[test]
    fn test_parse_with_markers() {
        let parsed = parse_generation("SQL:\nSELECT 1\nInsight:\nTrivial");
        assert_eq!(parsed.sql, "SELECT 1");
        assert_eq!(parsed.insight, "Trivial");
    }

    #[test]
    fn test_parse_fallback() {
        let parsed = parse_generation("just some text");
        assert_eq!(parsed.sql, "just some text");
        assert_eq!(parsed.insight, INSIGHT_FALLBACK);
    }

    #[test]
    fn test_insight_before_sql_falls_back() {
        let text = "Insight: first\nSQL: SELECT 1 LIMIT 1";
        let parsed = parse_generation(text);
        assert_eq!(parsed.sql, text);
        assert_eq!(parsed.insight, INSIGHT_FALLBACK);
    }

    #[test]
    fn test_fenced_sql_is_unwrapped() {
        let parsed = parse_generation("SQL:\n```sql\nSELECT 1 LIMIT 1\n```\nInsight: One row.");
        assert_eq!(parsed.sql, "SELECT 1 LIMIT 1");
        assert_eq!(parsed.insight, "One row.");
    }

    #[test]
    fn test_fenced_unmarked_response_is_unwrapped() {
        let parsed = parse_generation("```sql\nSELECT region FROM sales LIMIT 5\n```\n");
        assert_eq!(parsed.sql, "SELECT region FROM sales LIMIT 5");
        assert_eq!(parsed.insight, INSIGHT_FALLBACK);
    }

    #[test]
    fn test_retrieval_query() {
        assert_eq!(retrieval_query(42), "Generate SQL and insight for dashboard 42");
    }
}
