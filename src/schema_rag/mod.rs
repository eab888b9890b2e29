//! Schema RAG - retrieval of dashboard context for generation
//!
//! Training documents are embedded once and upserted by id into a vector
//! index; generation queries the index for the nearest documents.

pub mod embedder;
pub mod retriever;
pub mod vector_store;

pub use embedder::{Embedder, OpenAiEmbedder};
pub use retriever::RetrievalIndex;
pub use vector_store::{ChromaIndex, RetrievalHit, VectorIndex};
