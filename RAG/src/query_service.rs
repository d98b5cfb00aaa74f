use crate::config::{EmbeddingProvider, RagConfig};
use crate::document_processor::{DocumentProcessor, FileLoader, PdfLoader};
use crate::embedding_service::{Embedder, GeminiEmbedder, HashingEmbedder};
use crate::gemini_service::{GeminiService, LlmClient};
use crate::models::*;
use crate::vector_index::VectorIndex;
use anyhow::Result;
use std::sync::Arc;

/// Answers one question about one uploaded PDF.
///
/// Every call stages and parses the upload, builds a fresh [`VectorIndex`]
/// and drops it once the model has answered. Nothing is shared between
/// calls except the clients themselves.
pub struct QueryService {
    processor: DocumentProcessor,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LlmClient>,
    similarity_top_k: usize,
}

impl QueryService {
    pub fn new(
        config: &RagConfig,
        loader: Arc<dyn FileLoader>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClient>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            processor: DocumentProcessor::new(loader, config.chunk_size, config.chunk_overlap)?,
            embedder,
            llm,
            similarity_top_k: config.similarity_top_k,
        })
    }

    /// Wires the PDF loader and the Gemini clients selected by `config`.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = match config.embedding_provider {
            EmbeddingProvider::Gemini => Arc::new(GeminiEmbedder::new(config)?),
            EmbeddingProvider::Local => Arc::new(HashingEmbedder::default()),
        };
        let llm: Arc<dyn LlmClient> = Arc::new(GeminiService::new(config)?);

        log::info!(
            "Query service ready (chat model: {}, embeddings: {:?}/{}, top_k: {})",
            config.chat_model,
            config.embedding_provider,
            config.embedding_model,
            config.similarity_top_k
        );

        Self::new(config, Arc::new(PdfLoader::new()), embedder, llm)
    }

    pub async fn answer(&self, upload: &PdfUpload, query: &str) -> Result<String> {
        let response = self.query(upload, query).await?;
        Ok(response.response)
    }

    pub async fn query(&self, upload: &PdfUpload, query: &str) -> Result<QueryResponse> {
        let document = self.processor.process_upload(upload).await?;
        let index = VectorIndex::from_documents(vec![document], self.embedder.clone()).await?;

        let engine = index.as_query_engine(self.llm.clone(), self.similarity_top_k);
        let response = engine.query(query).await?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct Utf8Loader;

    #[async_trait]
    impl FileLoader for Utf8Loader {
        async fn load_text(&self, upload: &PdfUpload) -> Result<String> {
            Ok(String::from_utf8(upload.data.clone())?)
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl FileLoader for FailingLoader {
        async fn load_text(&self, _upload: &PdfUpload) -> Result<String> {
            Err(anyhow!("unreadable PDF"))
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            Ok(format!("prompt had {} characters", prompt.len()))
        }
    }

    fn service(loader: Arc<dyn FileLoader>) -> QueryService {
        QueryService::new(
            &RagConfig::default(),
            loader,
            Arc::new(HashingEmbedder::default()),
            Arc::new(EchoLlm),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_answer_runs_the_whole_pipeline() {
        let service = service(Arc::new(Utf8Loader));
        let upload = PdfUpload::new(
            "policy.pdf",
            b"Maternity expenses are covered after nine months. Dental care is excluded.".to_vec(),
        );

        let response = service.query(&upload, "Are maternity expenses covered?").await.unwrap();

        assert!(response.response.starts_with("prompt had"));
        assert_eq!(response.source_chunks.len(), 1);
        assert!(response.source_chunks[0].chunk.content.contains("Maternity"));
    }

    #[tokio::test]
    async fn test_loader_errors_propagate() {
        let service = service(Arc::new(FailingLoader));
        let upload = PdfUpload::new("broken.pdf", Vec::new());

        let err = service.answer(&upload, "anything").await.unwrap_err();
        assert!(err.to_string().contains("unreadable PDF"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RagConfig {
            chunk_size: 10,
            chunk_overlap: 10,
            ..RagConfig::default()
        };
        let result = QueryService::new(
            &config,
            Arc::new(Utf8Loader),
            Arc::new(HashingEmbedder::default()),
            Arc::new(EchoLlm),
        );

        assert!(result.is_err());
    }
}
