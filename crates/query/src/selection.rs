use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use index::EvidencePayload;

/// Weights of the stage-2 score
/// `similarity + connectivity_weight * connectivity - redundancy_weight * overlap`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    pub connectivity_weight: f32,
    pub redundancy_weight: f32,
    /// Word-set overlap at which a candidate counts as a duplicate of an
    /// already selected sentence.
    pub duplicate_threshold: f32,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            connectivity_weight: 0.15,
            redundancy_weight: 0.3,
            duplicate_threshold: 0.9,
        }
    }
}

/// A stage-1 hit with its payload.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub row: usize,
    pub similarity: f32,
    pub payload: &'a EvidencePayload,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selected {
    pub row: usize,
    pub similarity: f32,
    pub connectivity: f32,
    pub score: f32,
}

fn endpoints<'a>(candidate: &Candidate<'a>) -> HashSet<&'a str> {
    [candidate.payload.source.as_str(), candidate.payload.target.as_str()]
        .into_iter()
        .collect()
}

/// Fraction of each candidate's endpoints shared with some other candidate.
pub fn connectivity(candidates: &[Candidate<'_>]) -> Vec<f32> {
    let mut owners: HashMap<&str, usize> = HashMap::new();
    for candidate in candidates {
        for entity in endpoints(candidate) {
            *owners.entry(entity).or_default() += 1;
        }
    }

    candidates
        .iter()
        .map(|candidate| {
            let own = endpoints(candidate);
            let shared = own.iter().filter(|e| owners.get(*e).copied().unwrap_or(0) > 1).count();
            shared as f32 / own.len() as f32
        })
        .collect()
}

fn word_set(sentence: &str) -> HashSet<String> {
    sentence
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    shared as f32 / (a.len() + b.len() - shared) as f32
}

fn better(a: &Selected, b: &Selected) -> Ordering {
    a.score
        .partial_cmp(&b.score)
        .unwrap_or(Ordering::Equal)
        .then(a.similarity.partial_cmp(&b.similarity).unwrap_or(Ordering::Equal))
        .then(b.row.cmp(&a.row))
}

/// Greedily pick up to `k` candidates. Each round scores the remaining
/// candidates against what is already picked and takes the best one that is
/// not a near-duplicate; duplicates are taken only when nothing else is left.
/// Deterministic for a fixed candidate list. The result is ordered by score,
/// highest first.
pub fn select(candidates: &[Candidate<'_>], k: usize, policy: &SelectionPolicy) -> Vec<Selected> {
    let connectivity = connectivity(candidates);
    let words: Vec<HashSet<String>> = candidates.iter().map(|c| word_set(&c.payload.sentence)).collect();

    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut picked: Vec<usize> = Vec::new();
    let mut selected: Vec<Selected> = Vec::new();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_fresh: Option<(usize, Selected)> = None;
        let mut best_any: Option<(usize, Selected)> = None;

        for (slot, &i) in remaining.iter().enumerate() {
            let overlap = picked
                .iter()
                .map(|&p| jaccard(&words[i], &words[p]))
                .fold(0.0f32, f32::max);
            let scored = Selected {
                row: candidates[i].row,
                similarity: candidates[i].similarity,
                connectivity: connectivity[i],
                score: candidates[i].similarity + policy.connectivity_weight * connectivity[i]
                    - policy.redundancy_weight * overlap,
            };

            if best_any.as_ref().is_none_or(|(_, b)| better(&scored, b) == Ordering::Greater) {
                best_any = Some((slot, scored));
            }
            if overlap < policy.duplicate_threshold
                && best_fresh.as_ref().is_none_or(|(_, b)| better(&scored, b) == Ordering::Greater)
            {
                best_fresh = Some((slot, scored));
            }
        }

        let Some((slot, choice)) = best_fresh.or(best_any) else {
            break;
        };
        picked.push(remaining.remove(slot));
        selected.push(choice);
    }

    selected.sort_by(|a, b| better(b, a));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(source: &str, target: &str, sentence: &str) -> EvidencePayload {
        EvidencePayload {
            edge_id: format!("{}-{}-r#0", source, target),
            source: source.into(),
            target: target.into(),
            label: "r".into(),
            sentence: sentence.into(),
            chunk_id: Some(0),
        }
    }

    fn candidates(payloads: &[EvidencePayload], sims: &[f32]) -> Vec<Candidate<'static>> {
        let leaked: &'static [EvidencePayload] = Box::leak(payloads.to_vec().into_boxed_slice());
        leaked
            .iter()
            .zip(sims)
            .enumerate()
            .map(|(row, (payload, &similarity))| Candidate { row, similarity, payload })
            .collect()
    }

    #[test]
    fn connected_evidence_beats_isolated_evidence() {
        let payloads = vec![
            payload("Curie", "Warsaw", "Curie was born in Warsaw."),
            payload("Island", "Sea", "The island lies in the sea."),
            payload("Warsaw", "Poland", "Warsaw is the capital of Poland."),
        ];
        let cands = candidates(&payloads, &[0.80, 0.82, 0.75]);

        let picked = select(&cands, 2, &SelectionPolicy::default());
        let rows: Vec<usize> = picked.iter().map(|s| s.row).collect();

        // 0.80 + 0.15 * 0.5 beats 0.82 + 0
        assert_eq!(rows[0], 0);
        assert!(rows.contains(&2) || rows.contains(&1));
        assert_eq!(connectivity(&cands), vec![0.5, 0.0, 0.5]);
    }

    #[test]
    fn near_duplicates_are_skipped_while_others_remain() {
        let payloads = vec![
            payload("A", "B", "Alpha founded Beta in 1990."),
            payload("A", "B", "Alpha founded Beta in 1990 ."),
            payload("C", "D", "Gamma acquired Delta."),
        ];
        let cands = candidates(&payloads, &[0.9, 0.89, 0.5]);

        let picked = select(&cands, 2, &SelectionPolicy::default());
        let rows: Vec<usize> = picked.iter().map(|s| s.row).collect();
        assert_eq!(rows, vec![0, 2]);

        let all = select(&cands, 3, &SelectionPolicy::default());
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn selection_is_deterministic_with_ties() {
        let payloads = vec![
            payload("A", "B", "one fact"),
            payload("C", "D", "another claim"),
            payload("E", "F", "third statement"),
        ];
        let cands = candidates(&payloads, &[0.5, 0.5, 0.5]);

        let first = select(&cands, 2, &SelectionPolicy::default());
        let second = select(&cands, 2, &SelectionPolicy::default());

        assert_eq!(first, second);
        assert_eq!(first.iter().map(|s| s.row).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn wider_recall_never_lowers_best_score() {
        let payloads = vec![
            payload("A", "B", "a b"),
            payload("C", "D", "c d"),
            payload("E", "F", "e f"),
            payload("B", "C", "b c"),
            payload("D", "E", "d e"),
            payload("X", "Y", "x y"),
        ];
        let sims = [0.9, 0.85, 0.8, 0.7, 0.6, 0.5];
        let policy = SelectionPolicy::default();

        let mut previous = f32::MIN;
        for k1 in 1..=payloads.len() {
            let cands = candidates(&payloads[..k1], &sims[..k1]);
            let best = select(&cands, 2, &policy)[0].score;
            assert!(best >= previous, "k1={} lowered best score", k1);
            previous = best;
        }
    }

    #[test]
    fn k_larger_than_pool_takes_everything() {
        let payloads = vec![payload("A", "B", "x"), payload("C", "D", "y")];
        let cands = candidates(&payloads, &[0.2, 0.1]);
        assert_eq!(select(&cands, 10, &SelectionPolicy::default()).len(), 2);
        assert!(select(&[], 3, &SelectionPolicy::default()).is_empty());
    }

    #[test]
    fn jaccard_of_word_sets() {
        let a = word_set("The cat sat.");
        let b = word_set("the CAT ran");
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-6);
        assert_eq!(jaccard(&HashSet::new(), &HashSet::new()), 0.0);
    }
}
