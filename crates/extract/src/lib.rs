pub mod checkpoint;
pub mod llm;
pub mod prompt;
pub mod schema;

pub use checkpoint::JsonCheckpoint;
pub use llm::{CompletionRequest, LanguageModel, OllamaClient, OpenAiClient, ResponseFormat};
pub use prompt::PromptTemplate;
pub use schema::{successful_records, Evidence, ExtractionOutcome, TripleCollection, TripleRecord};

use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use ingest::Chunk;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub workers: usize,
    /// Persist the collection after this many newly completed chunks.
    pub checkpoint_every: usize,
    pub temperature: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            workers: 50,
            checkpoint_every: 10,
            temperature: 0.0,
        }
    }
}

#[derive(Debug)]
pub struct ExtractionRun {
    pub outcomes: TripleCollection,
    pub submitted: usize,
    pub failed: usize,
}

pub struct TripleExtractor {
    llm: Arc<dyn LanguageModel>,
    prompt: PromptTemplate,
    config: ExtractorConfig,
}

impl TripleExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>, prompt: PromptTemplate, config: ExtractorConfig) -> Self {
        Self { llm, prompt, config }
    }

    /// Extract triples for every chunk lacking a successful result, writing
    /// each outcome into its chunk's slot and checkpointing as it goes.
    pub async fn run(&self, chunks: &[Chunk], checkpoint: &JsonCheckpoint) -> Result<ExtractionRun> {
        let mut slots = self.load_slots(chunks.len(), checkpoint).await?;

        let pending: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().is_none_or(ExtractionOutcome::is_error))
            .map(|(idx, _)| idx)
            .collect();

        tracing::info!(
            chunks = chunks.len(),
            pending = pending.len(),
            "Starting triple extraction"
        );

        if pending.is_empty() {
            return Ok(ExtractionRun {
                outcomes: slots,
                submitted: 0,
                failed: 0,
            });
        }

        let every = self.config.checkpoint_every.max(1);
        let mut completed = 0;
        let mut failed = 0;

        let mut results = stream::iter(pending.iter().map(|&idx| {
            let chunk = &chunks[idx];
            async move { (idx, self.extract_chunk(chunk).await) }
        }))
        .buffer_unordered(self.config.workers.max(1));

        while let Some((idx, outcome)) = results.next().await {
            if let ExtractionOutcome::Error { message, .. } = &outcome {
                tracing::warn!(chunk = idx, error = %message, "Extraction failed");
                failed += 1;
            }
            slots[idx] = Some(outcome);
            completed += 1;

            if completed % every == 0 || completed == pending.len() {
                checkpoint.write(&slots).await?;
                tracing::debug!(completed, total = pending.len(), "Checkpointed extraction results");
            }
        }

        tracing::info!(submitted = pending.len(), failed, "Triple extraction finished");

        Ok(ExtractionRun {
            outcomes: slots,
            submitted: pending.len(),
            failed,
        })
    }

    /// One request per chunk; any failure becomes an error slot.
    pub async fn extract_chunk(&self, chunk: &Chunk) -> ExtractionOutcome {
        let prompt = prompt::build_extraction_prompt(&self.prompt, &chunk.text);
        let request = CompletionRequest::structured(prompt, self.config.temperature)
            .with_system(prompt::EXTRACTION_SYSTEM);

        match self.llm.complete(request).await {
            Ok(raw) => schema::parse_response(chunk.id, &raw),
            Err(e) => ExtractionOutcome::Error {
                chunk_id: chunk.id,
                message: format!("{:#}", e),
            },
        }
    }

    async fn load_slots(&self, len: usize, checkpoint: &JsonCheckpoint) -> Result<TripleCollection> {
        let Some(mut slots) = checkpoint.load::<TripleCollection>().await? else {
            return Ok(vec![None; len]);
        };

        if slots.len() > len {
            anyhow::bail!(
                "Checkpoint {:?} holds {} results but the corpus has {} chunks",
                checkpoint.path(),
                slots.len(),
                len
            );
        }

        tracing::info!(existing = slots.len(), "Loaded existing extraction results");
        slots.resize(len, None);
        Ok(slots)
    }
}

/// Read a finished (or partial) collection from disk.
pub async fn load_triples(path: &std::path::Path) -> Result<TripleCollection> {
    let checkpoint = JsonCheckpoint::new(path);
    match checkpoint.load::<TripleCollection>().await? {
        Some(slots) => Ok(slots),
        None => anyhow::bail!("No readable triple collection at {:?}", path),
    }
}
