use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use extract::{CompletionRequest, LanguageModel, PromptTemplate};
use index::{CorpusSnapshot, Embedder};
use ingest::Tokenizer;

use crate::context::{AssembledContext, ContextAssembler};
use crate::error::RetrievalError;
use crate::selection::{select, Candidate, Selected, SelectionPolicy};

pub const DEFAULT_ANSWER_PROMPT: &str = r#"---Role---
You are a question answering assistant that reasons over knowledge-graph evidence.

---Goal---
Answer the Query using only the Information below. Follow the relations step by step when the answer needs more than one fact.
If the answer is yes or no, reply "Yes" or "No" only.

---Response Rules---
- Reply with a short phrase (at most 5 words)
- Reply in the language of the Query
- Do not add facts that are not in the Information

---Information---
{{context}}

---Query---
{{question}}
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub max_context_tokens: usize,
    pub extra_witnesses: usize,
    pub temperature: f32,
    pub policy: SelectionPolicy,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 4000,
            extra_witnesses: 2,
            temperature: 0.0,
            policy: SelectionPolicy::default(),
        }
    }
}

/// Evidence chosen for one query, before generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub candidates: usize,
    pub selected: Vec<Selected>,
    pub context: AssembledContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub answer: String,
    pub elapsed_seconds: f64,
    pub context: String,
    pub context_token_count: usize,
    pub chunk_ids: BTreeSet<usize>,
    pub sentence_chunk_ids: BTreeSet<usize>,
}

/// Two-stage graph retriever over a read-only corpus snapshot. Safe to share
/// across concurrent queries.
pub struct Retriever {
    snapshot: Arc<CorpusSnapshot>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    tokenizer: Arc<dyn Tokenizer>,
    prompt: PromptTemplate,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(
        snapshot: Arc<CorpusSnapshot>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        tokenizer: Arc<dyn Tokenizer>,
        prompt: PromptTemplate,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            snapshot,
            embedder,
            llm,
            tokenizer,
            prompt,
            config,
        }
    }

    /// Stage 1 recall, stage 2 selection and context assembly.
    pub async fn retrieve(&self, query: &str, top_k1: usize, top_k2: usize) -> Result<Retrieval, RetrievalError> {
        if self.snapshot.index.is_empty() {
            return Err(RetrievalError::EmptyIndex);
        }

        // Step 1: Embed the query
        let query_vector = self
            .embedder
            .embed_normalized(query)
            .await
            .map_err(RetrievalError::Embedding)?;

        // Step 2: Broad inner-product search
        let hits = self.snapshot.index.search(&query_vector, top_k1)?;
        let candidates: Vec<Candidate<'_>> = hits
            .iter()
            .filter_map(|hit| {
                self.snapshot.payload(hit.row).map(|payload| Candidate {
                    row: hit.row,
                    similarity: hit.score,
                    payload,
                })
            })
            .collect();

        // Step 3: Narrow to connected, non-redundant evidence
        let selected = select(&candidates, top_k2.min(top_k1), &self.config.policy);

        // Step 4: Build the context under the token budget
        let context = ContextAssembler::new(
            &self.snapshot,
            self.tokenizer.as_ref(),
            self.config.max_context_tokens,
            self.config.extra_witnesses,
        )
        .assemble(&selected);

        tracing::debug!(
            candidates = candidates.len(),
            selected = selected.len(),
            tokens = context.token_count,
            "Retrieved evidence"
        );

        Ok(Retrieval {
            candidates: candidates.len(),
            selected,
            context,
        })
    }

    pub async fn answer(&self, query: &str, top_k1: usize, top_k2: usize) -> Result<AnswerOutcome, RetrievalError> {
        let started = Instant::now();

        let retrieval = self.retrieve(query, top_k1, top_k2).await?;

        let prompt = self
            .prompt
            .render(&[("context", retrieval.context.text.as_str()), ("question", query)]);
        let answer = self
            .llm
            .complete(CompletionRequest::text(prompt, self.config.temperature))
            .await
            .map_err(RetrievalError::Generation)?;

        let AssembledContext {
            text,
            token_count,
            chunk_ids,
            sentence_chunk_ids,
            ..
        } = retrieval.context;

        Ok(AnswerOutcome {
            answer,
            elapsed_seconds: started.elapsed().as_secs_f64(),
            context: text,
            context_token_count: token_count,
            chunk_ids,
            sentence_chunk_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graph::KnowledgeGraph;
    use index::{EvidencePayload, FlatIpIndex};
    use ingest::BpeTokenizer;
    use std::sync::Mutex;

    /// Maps a handful of keywords onto fixed axes.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let text = text.to_lowercase();
            if text.contains("offline") {
                anyhow::bail!("embedding service offline");
            }
            let axes = ["born", "nobel", "warsaw", "poland"];
            let mut v: Vec<f32> = axes.iter().map(|a| if text.contains(a) { 1.0 } else { 0.0 }).collect();
            v.push(0.1);
            Ok(v)
        }
    }

    struct EchoModel {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("rate limited");
            }
            self.prompts.lock().unwrap().push(request.prompt);
            Ok("Warsaw".to_string())
        }
    }

    async fn snapshot() -> CorpusSnapshot {
        let mut graph = KnowledgeGraph::new();
        let facts = [
            ("Curie", "born in", "Warsaw", "Curie was born in Warsaw.", 0),
            ("Warsaw", "capital of", "Poland", "Warsaw is the capital of Poland.", 1),
            ("Curie", "won", "Nobel Prize", "Curie won the Nobel Prize.", 2),
        ];
        let embedder = KeywordEmbedder;
        let mut index = FlatIpIndex::new(5);
        let mut payloads = Vec::new();
        for (s, r, o, sentence, chunk) in facts {
            graph.add_relation(s, r, o, &[sentence], chunk);
            index.add(&embedder.embed_normalized(sentence).await.unwrap()).unwrap();
            payloads.push(EvidencePayload {
                edge_id: graph::edge_id(s, o, r, 0),
                source: s.into(),
                target: o.into(),
                label: r.into(),
                sentence: sentence.into(),
                chunk_id: Some(chunk),
            });
        }
        CorpusSnapshot::new(index, payloads, graph).unwrap()
    }

    async fn retriever(fail: bool) -> (Retriever, Arc<EchoModel>) {
        let llm = Arc::new(EchoModel { prompts: Mutex::new(Vec::new()), fail });
        let retriever = Retriever::new(
            Arc::new(snapshot().await),
            Arc::new(KeywordEmbedder),
            llm.clone(),
            Arc::new(BpeTokenizer::o200k().unwrap()),
            PromptTemplate::new(DEFAULT_ANSWER_PROMPT),
            RetrieverConfig::default(),
        );
        (retriever, llm)
    }

    #[tokio::test]
    async fn answer_fills_prompt_and_reports_provenance() {
        let (retriever, llm) = retriever(false).await;

        let outcome = retriever
            .answer("Where was Curie born? Which country is Warsaw in?", 3, 2)
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Warsaw");
        assert!(outcome.context.contains("- Curie --born in--> Warsaw: Curie was born in Warsaw."));
        assert_eq!(outcome.chunk_ids, BTreeSet::from([0, 1]));
        assert!(outcome.sentence_chunk_ids.is_subset(&outcome.chunk_ids));
        assert!(outcome.context_token_count > 0);

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains(&outcome.context));
        assert!(prompts[0].contains("Which country is Warsaw in?"));
    }

    #[tokio::test]
    async fn selection_is_stable_across_calls() {
        let (retriever, _) = retriever(false).await;

        let first = retriever.retrieve("Warsaw Poland born", 3, 2).await.unwrap();
        let second = retriever.retrieve("Warsaw Poland born", 3, 2).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.candidates, 3);
        assert_eq!(first.selected.len(), 2);
    }

    #[tokio::test]
    async fn failures_are_typed() {
        let (healthy, _) = retriever(false).await;
        let err = healthy.answer("offline question", 3, 2).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding(_)));

        let (failing, _) = retriever(true).await;
        let err = failing.answer("Where was Curie born?", 3, 2).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Generation(_)));
    }

    #[tokio::test]
    async fn empty_index_is_rejected() {
        let snapshot = CorpusSnapshot::new(FlatIpIndex::new(5), Vec::new(), KnowledgeGraph::new()).unwrap();
        let retriever = Retriever::new(
            Arc::new(snapshot),
            Arc::new(KeywordEmbedder),
            Arc::new(EchoModel { prompts: Mutex::new(Vec::new()), fail: false }),
            Arc::new(BpeTokenizer::o200k().unwrap()),
            PromptTemplate::new(DEFAULT_ANSWER_PROMPT),
            RetrieverConfig::default(),
        );

        let err = retriever.answer("anything", 3, 2).await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyIndex));
    }
}
