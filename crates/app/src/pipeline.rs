use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use answer::{temp_output_path, Orchestrator, OrchestratorConfig, ProvenanceLog, QueryResult, RunStats};
use extract::{load_triples, ExtractorConfig, JsonCheckpoint, TripleExtractor};
use graph::KnowledgeGraph;
use index::{BuildOutcome, CorpusSnapshot, EvidenceIndexBuilder, IndexPaths, SnapshotPaths};
use query::Retriever;

use crate::config::AppConfig;
use crate::metrics::{StageTimings, TimedOperation};
use crate::providers::Services;

/// File layout of one dataset directory.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    pub dir: PathBuf,
    pub chunks: PathBuf,
    pub chunk_lines: PathBuf,
    pub triples: PathBuf,
    pub graph: PathBuf,
    pub index: PathBuf,
    pub payloads: PathBuf,
}

impl DatasetLayout {
    pub fn new(dir: PathBuf) -> Self {
        let IndexPaths { index, payloads } = IndexPaths::in_dir(&dir);
        Self {
            chunks: dir.join("chunks.json"),
            chunk_lines: dir.join("chunks.txt"),
            triples: dir.join("triples.json"),
            graph: dir.join("graph.json"),
            index,
            payloads,
            dir,
        }
    }

    pub fn default_input(&self) -> PathBuf {
        self.dir.join("contexts.txt")
    }

    fn files(&self) -> [&Path; 6] {
        [
            self.chunks.as_path(),
            self.chunk_lines.as_path(),
            self.triples.as_path(),
            self.graph.as_path(),
            self.index.as_path(),
            self.payloads.as_path(),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub dataset: String,
    pub input: Option<PathBuf>,
    pub skip_extraction: bool,
    pub skip_graph: bool,
    pub skip_index: bool,
}

fn require(path: &Path, hint: &str) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("{:?} not found; {}", path, hint);
    }
    Ok(())
}

/// Chunk, extract, build the graph and index the evidence, skipping the
/// stages the caller asked to skip.
pub async fn run_build(config: &AppConfig, opts: &BuildOptions, services: &Services) -> Result<StageTimings> {
    let layout = DatasetLayout::new(config.dataset_dir(&opts.dataset));
    tokio::fs::create_dir_all(&layout.dir)
        .await
        .context(format!("Failed to create dataset directory: {:?}", layout.dir))?;
    let mut timings = StageTimings::new();

    if !opts.skip_extraction {
        let input = opts.input.clone().unwrap_or_else(|| layout.default_input());
        require(&input, "pass --input or place contexts.txt in the dataset directory")?;

        let timer = TimedOperation::start();
        let chunks = ingest::prepare_chunks(&input, config.chunking, services.tokenizer.clone(), &layout.chunks).await?;
        timings.record("chunking", timer);

        let timer = TimedOperation::start();
        let extractor = TripleExtractor::new(
            services.llm.clone(),
            config.prompts.extraction.clone(),
            ExtractorConfig {
                workers: config.concurrency.extraction_workers,
                checkpoint_every: config.checkpoint.extraction_every,
                temperature: config.provider.temperature,
            },
        );
        let run = extractor.run(&chunks, &JsonCheckpoint::new(&layout.triples)).await?;
        if run.failed > 0 {
            tracing::warn!(failed = run.failed, "Some chunks failed; rerun build to retry them");
        }
        timings.record("extraction", timer);
    }

    if !opts.skip_graph {
        require(&layout.triples, "run extraction first")?;
        let timer = TimedOperation::start();
        let outcomes = load_triples(&layout.triples).await?;
        let graph = graph::build_graph(&outcomes);
        graph.save(&layout.graph).await?;
        timings.record("graph", timer);
    }

    if !opts.skip_index {
        require(&layout.triples, "run extraction first")?;
        require(&layout.graph, "run the graph stage first")?;
        let timer = TimedOperation::start();
        let outcomes = load_triples(&layout.triples).await?;
        let graph = KnowledgeGraph::load(&layout.graph).await?;
        let builder = EvidenceIndexBuilder::new(services.embedder.clone(), config.concurrency.embedding_workers);
        let paths = IndexPaths {
            index: layout.index.clone(),
            payloads: layout.payloads.clone(),
        };
        if let BuildOutcome::Built { rows, unresolved, .. } = builder.build(&graph, &outcomes, &paths).await? {
            tracing::info!(rows, unresolved, "Indexed evidence sentences");
        }
        timings.record("index", timer);
    }

    println!("Dataset {:?}:", layout.dir);
    for file in layout.files() {
        if let Ok(meta) = std::fs::metadata(file) {
            println!("  {:<24} {:>12} bytes", display_name(file), meta.len());
        }
    }
    println!("Timings:\n{}", timings.summary());

    Ok(timings)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct AnswerOptions {
    pub dataset: String,
    pub queries: PathBuf,
    pub output: PathBuf,
    pub log: Option<PathBuf>,
}

/// Answer a query file against a built dataset and write the results.
pub async fn run_answer(config: &AppConfig, opts: &AnswerOptions, services: &Services) -> Result<RunStats> {
    let dir = config.dataset_dir(&opts.dataset);
    let snapshot = CorpusSnapshot::load(&SnapshotPaths::in_dir(&dir))
        .await
        .context("Corpus snapshot is not usable; rerun build")?;
    let queries = answer::load_queries(&opts.queries).await?;

    if let Some(parent) = opts.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .context(format!("Failed to create output directory: {:?}", parent))?;
    }
    let log_path = opts.log.clone().unwrap_or_else(|| opts.output.with_file_name("used_chunks.jsonl"));

    let retriever = Retriever::new(
        Arc::new(snapshot),
        services.embedder.clone(),
        services.llm.clone(),
        services.tokenizer.clone(),
        config.prompts.answer.clone(),
        config.retrieval.retriever.clone(),
    );
    let orchestrator = Orchestrator::new(
        Arc::new(retriever),
        OrchestratorConfig {
            workers: config.concurrency.answer_workers,
            top_k1: config.retrieval.top_k1,
            top_k2: config.retrieval.top_k2,
            checkpoint_every: config.checkpoint.answer_every,
        },
    );

    let checkpoint = JsonCheckpoint::new(temp_output_path(&opts.output));
    let log = ProvenanceLog::create(&log_path).await?;
    let results: Vec<QueryResult> = orchestrator.run(&queries, &checkpoint, &log).await?;

    JsonCheckpoint::new(&opts.output).write(&results).await?;
    println!("Saved final output to {:?}", opts.output);

    let stats = RunStats::from_results(&results);
    match (stats.mean_time, stats.mean_context_tokens) {
        (Some(time), Some(tokens)) => {
            println!("Mean elapsed time: {:.2}s", time);
            println!("Mean context tokens: {:.1}", tokens);
        }
        _ => println!("No successful queries to average"),
    }
    println!("Failed queries: {} of {}", stats.failed, stats.total);

    Ok(stats)
}
