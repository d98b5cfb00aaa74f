pub mod config;
pub mod models;
pub mod document_processor;
pub mod embedding_service;
pub mod gemini_service;
pub mod vector_index;
pub mod query_engine;
pub mod query_service;

#[cfg(test)]
mod test_support;

pub use config::{EmbeddingProvider, RagConfig};
pub use models::*;
pub use document_processor::{DocumentProcessor, FileLoader, PdfLoader};
pub use embedding_service::{Embedder, GeminiEmbedder, HashingEmbedder};
pub use gemini_service::{GeminiService, LlmClient};
pub use vector_index::VectorIndex;
pub use query_engine::QueryEngine;
pub use query_service::QueryService;
