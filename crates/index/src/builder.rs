use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use extract::{successful_records, ExtractionOutcome};
use graph::{edge_id, KnowledgeGraph};

use crate::embeddings::Embedder;
use crate::payload::{save_payloads, EvidencePayload};
use crate::vector_store::FlatIpIndex;

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub index: PathBuf,
    pub payloads: PathBuf,
}

impl IndexPaths {
    pub fn in_dir(dir: &std::path::Path) -> Self {
        Self {
            index: dir.join("edge_index.bin"),
            payloads: dir.join("edge_payloads.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { rows: usize, dim: usize, unresolved: usize },
    /// An index file was already present; nothing was touched.
    AlreadyPresent,
}

/// Exact-text map from evidence sentence to the chunk that produced it.
/// A sentence emitted by several chunks maps to the last of them.
pub fn sentence_to_chunk(outcomes: &[Option<ExtractionOutcome>]) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for record in successful_records(outcomes) {
        for sentence in record.evidence.sentences() {
            map.insert(sentence.to_string(), record.chunk_id);
        }
    }
    map
}

/// One payload per distinct witness sentence, in edge insertion order. When
/// several edges share a sentence only the first edge is kept.
pub fn collect_payloads(
    graph: &KnowledgeGraph,
    sentence_chunks: &HashMap<String, usize>,
) -> Vec<EvidencePayload> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut payloads = Vec::new();

    for edge in graph.edges() {
        for (i, witness) in edge.witnesses.iter().enumerate() {
            if !seen.insert(witness.sentence.as_str()) {
                continue;
            }
            payloads.push(EvidencePayload {
                edge_id: edge_id(edge.source, edge.target, edge.label, i),
                source: edge.source.to_string(),
                target: edge.target.to_string(),
                label: edge.label.to_string(),
                sentence: witness.sentence.clone(),
                chunk_id: sentence_chunks.get(&witness.sentence).copied(),
            });
        }
    }
    payloads
}

pub struct EvidenceIndexBuilder {
    embedder: Arc<dyn Embedder>,
    workers: usize,
}

impl EvidenceIndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, workers: usize) -> Self {
        Self {
            embedder,
            workers: workers.max(1),
        }
    }

    /// Embed every distinct evidence sentence and persist the index with its
    /// payload store. Runs at most once: an existing index file is left alone.
    /// Any embedding failure aborts the build before anything is written.
    pub async fn build(
        &self,
        graph: &KnowledgeGraph,
        outcomes: &[Option<ExtractionOutcome>],
        paths: &IndexPaths,
    ) -> Result<BuildOutcome> {
        if paths.index.exists() {
            tracing::info!(path = ?paths.index, "Vector index already exists, skipping build");
            return Ok(BuildOutcome::AlreadyPresent);
        }

        let payloads = collect_payloads(graph, &sentence_to_chunk(outcomes));
        if payloads.is_empty() {
            anyhow::bail!("Graph has no evidence sentences to index");
        }

        let unresolved = payloads.iter().filter(|p| p.chunk_id.is_none()).count();
        tracing::info!(
            sentences = payloads.len(),
            unresolved,
            workers = self.workers,
            "Embedding evidence sentences"
        );

        let vectors: Vec<Vec<f32>> = stream::iter(payloads.iter().map(|payload| {
            let embedder = self.embedder.clone();
            async move {
                embedder
                    .embed_normalized(&payload.sentence)
                    .await
                    .with_context(|| format!("Failed to embed evidence for {}", payload.edge_id))
            }
        }))
        .buffered(self.workers)
        .try_collect()
        .await?;

        let dim = vectors[0].len();
        let mut index = FlatIpIndex::new(dim);
        for vector in &vectors {
            index.add(vector)?;
        }

        // payloads first: the index file marks a finished build
        save_payloads(&paths.payloads, &payloads).await?;
        index.save(&paths.index).await?;

        tracing::info!(rows = index.len(), dim, "Evidence index written");
        Ok(BuildOutcome::Built {
            rows: index.len(),
            dim,
            unresolved,
        })
    }
}
