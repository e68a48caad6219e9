pub mod orchestrator;
pub mod provenance;
pub mod stats;

pub use orchestrator::{
    load_queries, temp_output_path, Orchestrator, OrchestratorConfig, QueryAnswerer, QueryResult, ERROR_MARKER,
};
pub use provenance::{read_log, ProvenanceLog, ProvenanceRecord};
pub use stats::RunStats;
