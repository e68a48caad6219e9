pub mod context;
pub mod error;
pub mod retriever;
pub mod selection;

pub use context::{AssembledContext, ContextAssembler};
pub use error::RetrievalError;
pub use retriever::{AnswerOutcome, Retrieval, Retriever, RetrieverConfig, DEFAULT_ANSWER_PROMPT};
pub use selection::{select, Candidate, Selected, SelectionPolicy};
