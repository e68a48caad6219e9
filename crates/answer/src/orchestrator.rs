use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use extract::JsonCheckpoint;
use query::{AnswerOutcome, Retriever};

use crate::provenance::ProvenanceLog;

pub const ERROR_MARKER: &str = "[Error]";

/// Anything that can answer one query with provenance.
#[async_trait]
pub trait QueryAnswerer: Send + Sync {
    async fn answer(&self, query: &str, top_k1: usize, top_k2: usize) -> Result<AnswerOutcome>;
}

#[async_trait]
impl QueryAnswerer for Retriever {
    async fn answer(&self, query: &str, top_k1: usize, top_k2: usize) -> Result<AnswerOutcome> {
        Ok(Retriever::answer(self, query, top_k1, top_k2).await?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub answer: String,
    pub time: f64,
    pub context_token_count: Option<usize>,
}

impl QueryResult {
    pub fn failed(query: &str, message: &str) -> Self {
        Self {
            query: query.to_string(),
            answer: format!("{} {}", ERROR_MARKER, message),
            time: 0.0,
            context_token_count: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.answer.starts_with(ERROR_MARKER)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub workers: usize,
    pub top_k1: usize,
    pub top_k2: usize,
    /// Write the partial results after this many completed queries.
    pub checkpoint_every: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 30,
            top_k1: 30,
            top_k2: 5,
            checkpoint_every: 10,
        }
    }
}

#[derive(Deserialize)]
struct QueryItem {
    query: String,
}

/// Queries from a JSON array of objects with a `query` field. Other fields
/// are ignored.
pub async fn load_queries(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .context(format!("Failed to read queries: {:?}", path))?;
    let items: Vec<QueryItem> = serde_json::from_str(&content)
        .context(format!("Failed to parse queries: {:?}", path))?;
    Ok(items.into_iter().map(|item| item.query).collect())
}

/// `result.json` checkpoints to `result_temp.json` next to it.
pub fn temp_output_path(output: &Path) -> std::path::PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "result".to_string());
    output.with_file_name(format!("{}_temp.json", stem))
}

pub struct Orchestrator {
    answerer: Arc<dyn QueryAnswerer>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(answerer: Arc<dyn QueryAnswerer>, config: OrchestratorConfig) -> Self {
        Self { answerer, config }
    }

    /// Answer every query concurrently. A failing query becomes an error
    /// record at its own index; it never stops the others. Results come back
    /// in input order.
    pub async fn run(
        &self,
        queries: &[String],
        checkpoint: &JsonCheckpoint,
        log: &ProvenanceLog,
    ) -> Result<Vec<QueryResult>> {
        let mut slots: Vec<Option<QueryResult>> = vec![None; queries.len()];
        let every = self.config.checkpoint_every.max(1);
        let mut completed = 0;
        let mut failed = 0;

        tracing::info!(
            queries = queries.len(),
            workers = self.config.workers,
            top_k1 = self.config.top_k1,
            top_k2 = self.config.top_k2,
            "Answering queries"
        );

        let mut results = stream::iter(
            queries
                .iter()
                .enumerate()
                .map(|(idx, query)| async move { (idx, self.answer_one(query, log).await) }),
        )
        .buffer_unordered(self.config.workers.max(1));

        while let Some((idx, result)) = results.next().await {
            if result.is_error() {
                failed += 1;
            }
            slots[idx] = Some(result);
            completed += 1;

            if completed % every == 0 {
                checkpoint.write(&slots).await?;
                tracing::debug!(completed, total = queries.len(), "Checkpointed answers");
            }
        }

        tracing::info!(completed, failed, "Finished answering");

        let results: Vec<QueryResult> = slots.into_iter().flatten().collect();
        if results.len() != queries.len() {
            anyhow::bail!("{} of {} queries produced no result", queries.len() - results.len(), queries.len());
        }
        Ok(results)
    }

    /// A lost provenance line is logged; the answer itself is kept.
    async fn answer_one(&self, query: &str, log: &ProvenanceLog) -> QueryResult {
        match self.answerer.answer(query, self.config.top_k1, self.config.top_k2).await {
            Ok(outcome) => {
                if let Err(e) = log.record(query, &outcome.chunk_ids, &outcome.sentence_chunk_ids).await {
                    tracing::warn!(query, error = %format!("{:#}", e), "Failed to record provenance");
                }
                QueryResult {
                    query: query.to_string(),
                    answer: outcome.answer,
                    time: outcome.elapsed_seconds,
                    context_token_count: Some(outcome.context_token_count),
                }
            }
            Err(e) => {
                tracing::warn!(query, error = %format!("{:#}", e), "Query failed");
                QueryResult::failed(query, &format!("{:#}", e))
            }
        }
    }
}
