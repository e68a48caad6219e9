pub mod knowledge_graph;

pub use knowledge_graph::{edge_id, EdgeView, EntityNode, GraphStats, KnowledgeGraph, RelationEdge, Witness};

use extract::ExtractionOutcome;

/// Fold an extraction result collection into a graph. Empty and error slots
/// are skipped.
pub fn build_graph(outcomes: &[Option<ExtractionOutcome>]) -> KnowledgeGraph {
    let mut graph = KnowledgeGraph::new();
    let mut skipped = 0;

    for slot in outcomes {
        match slot {
            Some(ExtractionOutcome::Success { records, .. }) => {
                for record in records {
                    let sentences = record.evidence.sentences();
                    if sentences.is_empty() {
                        continue;
                    }
                    graph.add_relation(
                        &record.subject,
                        &record.relation,
                        &record.object,
                        &sentences,
                        record.chunk_id,
                    );
                }
            }
            Some(ExtractionOutcome::Error { chunk_id, .. }) => {
                tracing::debug!(chunk = chunk_id, "Skipping failed extraction");
                skipped += 1;
            }
            None => skipped += 1,
        }
    }

    let stats = graph.stats();
    tracing::info!(
        entities = stats.entity_count,
        relations = stats.relation_count,
        witnesses = stats.witness_count,
        skipped,
        "Built knowledge graph"
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{Evidence, TripleRecord};

    fn record(s: &str, r: &str, o: &str, evidence: Evidence, chunk_id: usize) -> TripleRecord {
        TripleRecord {
            subject: s.into(),
            relation: r.into(),
            object: o.into(),
            evidence,
            chunk_id,
        }
    }

    #[test]
    fn error_and_empty_slots_are_skipped() {
        let outcomes = vec![
            Some(ExtractionOutcome::Success {
                chunk_id: 0,
                records: vec![record("A", "r", "B", Evidence::One("A r B.".into()), 0)],
            }),
            Some(ExtractionOutcome::Error { chunk_id: 1, message: "timeout".into() }),
            None,
            Some(ExtractionOutcome::Success {
                chunk_id: 3,
                records: vec![record(
                    "A",
                    "r",
                    "B",
                    Evidence::Many(vec!["Again A r B.".into(), "A r B.".into()]),
                    3,
                )],
            }),
        ];

        let graph = build_graph(&outcomes);
        let edge = graph.relation("A", "r", "B").unwrap();

        assert_eq!(graph.stats().relation_count, 1);
        assert_eq!(
            edge.witnesses,
            vec![
                Witness { sentence: "A r B.".into(), chunk_id: 0 },
                Witness { sentence: "Again A r B.".into(), chunk_id: 3 },
            ]
        );
    }

    #[test]
    fn entities_appear_on_first_reference() {
        let outcomes = vec![Some(ExtractionOutcome::Success {
            chunk_id: 0,
            records: vec![
                record("Ada Lovelace", "worked with", "Charles Babbage", Evidence::One("s1".into()), 0),
                record("Charles Babbage", "designed", "Analytical Engine", Evidence::One("s2".into()), 0),
            ],
        })];

        let graph = build_graph(&outcomes);

        assert_eq!(graph.stats().entity_count, 3);
        assert!(graph.entity("Charles Babbage").is_some());
        assert!(graph.relation("Ada Lovelace", "worked with", "Charles Babbage").is_some());
        assert!(graph.relation("Charles Babbage", "designed", "Analytical Engine").is_some());
    }
}
