//! kgrag: build a knowledge graph over a corpus and answer questions
//! against it with provenance.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod metrics;
mod pipeline;
mod providers;

use config::AppConfig;
use pipeline::{AnswerOptions, BuildOptions};

#[derive(Parser)]
#[command(name = "kgrag")]
#[command(about = "Graph-based retrieval-augmented question answering", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file; built-in defaults apply when omitted
    #[arg(long, env = "KGRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk a corpus, extract triples, build the graph and the evidence index
    Build {
        /// Dataset name; artifacts go to <data_root>/<dataset>/
        #[arg(short, long)]
        dataset: String,

        /// Corpus file, one document per line (defaults to contexts.txt in the dataset directory)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Reuse the triples already on disk
        #[arg(long, default_value_t = false)]
        skip_extraction: bool,

        /// Reuse the graph already on disk
        #[arg(long, default_value_t = false)]
        skip_graph: bool,

        /// Stop after the graph stage
        #[arg(long, default_value_t = false)]
        skip_index: bool,
    },

    /// Answer every query in a JSON file against a built dataset
    Answer {
        #[arg(short, long)]
        dataset: String,

        /// JSON array of {"query": ...} objects
        #[arg(short, long)]
        queries: PathBuf,

        /// Where to write the answers
        #[arg(short, long)]
        output: PathBuf,

        /// Candidates recalled from the index per query
        #[arg(long)]
        top_k1: Option<usize>,

        /// Edges kept after re-ranking
        #[arg(long)]
        top_k2: Option<usize>,

        /// Queries answered concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Provenance log path (defaults to used_chunks.jsonl next to the output)
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let mut filter = EnvFilter::from_default_env();
    for target in ["kgrag", "ingest", "extract", "graph", "index", "query", "answer"] {
        filter = filter.add_directive(format!("{}=info", target).parse()?);
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build {
            dataset,
            input,
            skip_extraction,
            skip_graph,
            skip_index,
        } => {
            config.validate()?;
            let services = providers::connect(&config.provider)?;
            let opts = BuildOptions {
                dataset,
                input,
                skip_extraction,
                skip_graph,
                skip_index,
            };
            pipeline::run_build(&config, &opts, &services).await?;
        }
        Commands::Answer {
            dataset,
            queries,
            output,
            top_k1,
            top_k2,
            workers,
            log,
        } => {
            if let Some(k) = top_k1 {
                config.retrieval.top_k1 = k;
            }
            if let Some(k) = top_k2 {
                config.retrieval.top_k2 = k;
            }
            if let Some(w) = workers {
                config.concurrency.answer_workers = w;
            }
            config.validate()?;
            let services = providers::connect(&config.provider)?;
            let opts = AnswerOptions {
                dataset,
                queries,
                output,
                log,
            };
            pipeline::run_answer(&config, &opts, &services).await?;
        }
    }

    Ok(())
}
