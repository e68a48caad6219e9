use anyhow::{Context, Result};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: Uuid,
    pub label: String,
}

/// One textual witness of a relation and the chunk it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub sentence: String,
    pub chunk_id: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub label: String,
    pub witnesses: Vec<Witness>,
}

/// Borrowed view of an edge with its endpoint labels resolved.
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub label: &'a str,
    pub witnesses: &'a [Witness],
}

/// Deterministic id of the `witness`-th sentence of an edge.
pub fn edge_id(source: &str, target: &str, label: &str, witness: usize) -> String {
    format!("{}-{}-{}", source, target, label).replace(' ', "_") + &format!("#{}", witness)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
    pub witness_count: usize,
}

/// Directed property graph of entities and evidence-backed relations.
/// Nodes are created on first reference; one edge per
/// (subject, relation, object) regardless of how many records support it.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    graph: DiGraph<EntityNode, RelationEdge>,
    entity_to_idx: HashMap<String, NodeIndex>,
    relation_to_idx: HashMap<(NodeIndex, NodeIndex, String), EdgeIndex>,
}

#[derive(Serialize, Deserialize)]
struct GraphSnapshot {
    entities: Vec<EntityNode>,
    relations: Vec<StoredRelation>,
}

#[derive(Serialize, Deserialize)]
struct StoredRelation {
    source: String,
    target: String,
    label: String,
    witnesses: Vec<Witness>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, label: &str) -> NodeIndex {
        if let Some(&idx) = self.entity_to_idx.get(label) {
            return idx;
        }

        let idx = self.graph.add_node(EntityNode {
            id: Uuid::new_v4(),
            label: label.to_string(),
        });
        self.entity_to_idx.insert(label.to_string(), idx);
        idx
    }

    /// Create or extend the edge `subject -relation-> object`. Sentences the
    /// edge already carries are not added twice.
    pub fn add_relation(
        &mut self,
        subject: &str,
        relation: &str,
        object: &str,
        sentences: &[&str],
        chunk_id: usize,
    ) -> EdgeIndex {
        let source = self.add_entity(subject);
        let target = self.add_entity(object);

        let key = (source, target, relation.to_string());
        let edge = match self.relation_to_idx.get(&key) {
            Some(&edge) => edge,
            None => {
                let edge = self.graph.add_edge(
                    source,
                    target,
                    RelationEdge {
                        label: relation.to_string(),
                        witnesses: Vec::new(),
                    },
                );
                self.relation_to_idx.insert(key, edge);
                edge
            }
        };

        let witnesses = &mut self.graph[edge].witnesses;
        for sentence in sentences {
            if !witnesses.iter().any(|w| w.sentence == *sentence) {
                witnesses.push(Witness {
                    sentence: sentence.to_string(),
                    chunk_id,
                });
            }
        }
        edge
    }

    pub fn entity(&self, label: &str) -> Option<&EntityNode> {
        self.entity_to_idx.get(label).map(|&idx| &self.graph[idx])
    }

    pub fn relation(&self, subject: &str, relation: &str, object: &str) -> Option<&RelationEdge> {
        let source = *self.entity_to_idx.get(subject)?;
        let target = *self.entity_to_idx.get(object)?;
        self.relation_to_idx
            .get(&(source, target, relation.to_string()))
            .map(|&edge| &self.graph[edge])
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> {
        self.graph.edge_references().map(|edge| EdgeView {
            source: &self.graph[edge.source()].label,
            target: &self.graph[edge.target()].label,
            label: &edge.weight().label,
            witnesses: &edge.weight().witnesses,
        })
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            entity_count: self.graph.node_count(),
            relation_count: self.graph.edge_count(),
            witness_count: self.graph.edge_weights().map(|e| e.witnesses.len()).sum(),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = GraphSnapshot {
            entities: self.graph.node_weights().cloned().collect(),
            relations: self
                .edges()
                .map(|edge| StoredRelation {
                    source: edge.source.to_string(),
                    target: edge.target.to_string(),
                    label: edge.label.to_string(),
                    witnesses: edge.witnesses.to_vec(),
                })
                .collect(),
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json)
            .await
            .context(format!("Failed to write graph: {:?}", path))?;
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .context(format!("Failed to read graph: {:?}", path))?;
        let snapshot: GraphSnapshot = serde_json::from_str(&content)
            .context(format!("Failed to parse graph: {:?}", path))?;

        let mut graph = Self::new();
        for entity in snapshot.entities {
            let label = entity.label.clone();
            let idx = graph.graph.add_node(entity);
            graph.entity_to_idx.insert(label, idx);
        }

        for relation in snapshot.relations {
            let (Some(&source), Some(&target)) = (
                graph.entity_to_idx.get(&relation.source),
                graph.entity_to_idx.get(&relation.target),
            ) else {
                anyhow::bail!(
                    "Graph {:?} has an edge {} -> {} with an unknown endpoint",
                    path,
                    relation.source,
                    relation.target
                );
            };
            let key = (source, target, relation.label.clone());
            let edge = graph.graph.add_edge(
                source,
                target,
                RelationEdge {
                    label: relation.label,
                    witnesses: relation.witnesses,
                },
            );
            graph.relation_to_idx.insert(key, edge);
        }

        Ok(graph)
    }
}
