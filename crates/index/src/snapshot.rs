use std::path::{Path, PathBuf};

use graph::KnowledgeGraph;

use crate::builder::IndexPaths;
use crate::error::SnapshotError;
use crate::payload::{load_payloads, EvidencePayload};
use crate::vector_store::FlatIpIndex;

/// Everything retrieval reads, loaded once and shared read-only across
/// concurrent queries.
#[derive(Debug)]
pub struct CorpusSnapshot {
    pub index: FlatIpIndex,
    pub payloads: Vec<EvidencePayload>,
    pub graph: KnowledgeGraph,
}

#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub index: PathBuf,
    pub payloads: PathBuf,
    pub graph: PathBuf,
}

impl SnapshotPaths {
    pub fn in_dir(dir: &Path) -> Self {
        let IndexPaths { index, payloads } = IndexPaths::in_dir(dir);
        Self {
            index,
            payloads,
            graph: dir.join("graph.json"),
        }
    }
}

impl CorpusSnapshot {
    pub fn new(index: FlatIpIndex, payloads: Vec<EvidencePayload>, graph: KnowledgeGraph) -> Result<Self, SnapshotError> {
        if index.len() != payloads.len() {
            return Err(SnapshotError::RowCountMismatch {
                rows: index.len(),
                payloads: payloads.len(),
            });
        }
        Ok(Self { index, payloads, graph })
    }

    /// Load and cross-check the three snapshot files. Fails before any query
    /// runs if the index and payload store disagree.
    pub async fn load(paths: &SnapshotPaths) -> Result<Self, SnapshotError> {
        let index = FlatIpIndex::load(&paths.index).await?;
        let payloads = load_payloads(&paths.payloads).await?;

        if !paths.graph.exists() {
            return Err(SnapshotError::MissingGraph(paths.graph.clone()));
        }
        let graph = KnowledgeGraph::load(&paths.graph)
            .await
            .map_err(|e| SnapshotError::corrupt(&paths.graph, format!("{:#}", e)))?;

        let snapshot = Self::new(index, payloads, graph)?;
        tracing::info!(
            rows = snapshot.index.len(),
            dim = snapshot.index.dim(),
            relations = snapshot.graph.stats().relation_count,
            "Loaded corpus snapshot"
        );
        Ok(snapshot)
    }

    pub fn payload(&self, row: usize) -> Option<&EvidencePayload> {
        self.payloads.get(row)
    }
}
