use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use index::CorpusSnapshot;
use ingest::Tokenizer;

use crate::selection::Selected;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub token_count: usize,
    /// Chunk ids of every selected entry, whether or not it fit the budget.
    pub chunk_ids: BTreeSet<usize>,
    /// Chunk ids of the sentences that were actually written into `text`.
    pub sentence_chunk_ids: BTreeSet<usize>,
    /// Sentences in the order they appear in `text`.
    pub sentences: Vec<String>,
}

pub struct ContextAssembler<'a> {
    snapshot: &'a CorpusSnapshot,
    tokenizer: &'a dyn Tokenizer,
    max_tokens: usize,
    extra_witnesses: usize,
}

struct Draft<'t> {
    tokenizer: &'t dyn Tokenizer,
    max_tokens: usize,
    text: String,
    full: bool,
}

impl Draft<'_> {
    /// Append `line` if the whole text stays within budget. Once a line is
    /// refused nothing else is accepted.
    fn push(&mut self, line: &str) -> bool {
        if self.full {
            return false;
        }
        let candidate = if self.text.is_empty() {
            line.to_string()
        } else {
            format!("{}\n{}", self.text, line)
        };
        if self.tokenizer.count(&candidate) > self.max_tokens {
            self.full = true;
            return false;
        }
        self.text = candidate;
        true
    }
}

impl<'a> ContextAssembler<'a> {
    pub fn new(
        snapshot: &'a CorpusSnapshot,
        tokenizer: &'a dyn Tokenizer,
        max_tokens: usize,
        extra_witnesses: usize,
    ) -> Self {
        Self {
            snapshot,
            tokenizer,
            max_tokens,
            extra_witnesses,
        }
    }

    /// Render `selected` (already in score order) as one line per entry plus
    /// up to `extra_witnesses` further sentences of the same edge, dropping
    /// whole lines once the token budget is reached.
    pub fn assemble(&self, selected: &[Selected]) -> AssembledContext {
        let mut draft = Draft {
            tokenizer: self.tokenizer,
            max_tokens: self.max_tokens,
            text: String::new(),
            full: false,
        };
        let mut placed: HashSet<&str> = HashSet::new();
        let mut sentences = Vec::new();
        let mut chunk_ids = BTreeSet::new();
        let mut sentence_chunk_ids = BTreeSet::new();

        for entry in selected {
            let Some(payload) = self.snapshot.payload(entry.row) else {
                continue;
            };
            chunk_ids.extend(payload.chunk_id);

            if placed.contains(payload.sentence.as_str()) {
                continue;
            }
            let line = format!(
                "- {} --{}--> {}: {}",
                payload.source, payload.label, payload.target, payload.sentence
            );
            if !draft.push(&line) {
                continue;
            }
            placed.insert(&payload.sentence);
            sentences.push(payload.sentence.clone());
            sentence_chunk_ids.extend(payload.chunk_id);

            let Some(edge) = self.snapshot.graph.relation(&payload.source, &payload.label, &payload.target) else {
                continue;
            };
            let extras = edge
                .witnesses
                .iter()
                .filter(|w| w.sentence != payload.sentence)
                .take(self.extra_witnesses);
            for witness in extras {
                if placed.contains(witness.sentence.as_str()) {
                    continue;
                }
                if !draft.push(&format!("  also: {}", witness.sentence)) {
                    break;
                }
                placed.insert(&witness.sentence);
                sentences.push(witness.sentence.clone());
                sentence_chunk_ids.insert(witness.chunk_id);
            }
        }

        let token_count = self.tokenizer.count(&draft.text);
        AssembledContext {
            text: draft.text,
            token_count,
            chunk_ids,
            sentence_chunk_ids,
            sentences,
        }
    }
}
