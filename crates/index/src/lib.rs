pub mod builder;
pub mod embeddings;
pub mod error;
pub mod payload;
pub mod snapshot;
pub mod vector_store;

pub use builder::{collect_payloads, sentence_to_chunk, BuildOutcome, EvidenceIndexBuilder, IndexPaths};
pub use embeddings::{normalize, Embedder, EmbeddingClient, OpenAiEmbeddingClient};
pub use error::SnapshotError;
pub use payload::{load_payloads, save_payloads, EvidencePayload};
pub use snapshot::{CorpusSnapshot, SnapshotPaths};
pub use vector_store::{FlatIpIndex, SearchHit};
