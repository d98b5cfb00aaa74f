use crate::gemini_service::LlmClient;
use crate::models::*;
use crate::vector_index::VectorIndex;
use anyhow::Result;
use std::sync::Arc;

/// Retrieval over a [`VectorIndex`] followed by a single model call.
pub struct QueryEngine<'a> {
    index: &'a VectorIndex,
    llm: Arc<dyn LlmClient>,
    similarity_top_k: usize,
}

impl<'a> QueryEngine<'a> {
    pub fn new(index: &'a VectorIndex, llm: Arc<dyn LlmClient>, similarity_top_k: usize) -> Self {
        Self {
            index,
            llm,
            similarity_top_k,
        }
    }

    pub async fn query(&self, query: &str) -> Result<QueryResponse> {
        let start_time = std::time::Instant::now();

        let source_chunks = self.index.retrieve(query, self.similarity_top_k).await?;
        for scored in &source_chunks {
            log::debug!(
                "Context chunk {} of {} (score {:.3})",
                scored.chunk.chunk_index,
                scored.filename,
                scored.score
            );
        }

        let context = build_context(&source_chunks);
        let prompt = build_prompt(query, &context);
        let response = self.llm.complete(&prompt).await?;

        log::info!(
            "Answered query with {} context chunks in {} ms",
            source_chunks.len(),
            start_time.elapsed().as_millis()
        );

        Ok(QueryResponse {
            response,
            source_chunks,
        })
    }
}

pub fn build_context(chunks: &[ScoredChunk]) -> String {
    let mut context = String::new();

    for scored in chunks {
        context.push_str(&format!(
            "Document: {}\nContent: {}\n\n",
            scored.filename, scored.chunk.content
        ));
    }

    context.trim_end().to_string()
}

pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        r#"Context information is below.
---------------------
{context}
---------------------
Given the context information and not prior knowledge, answer the query.
Query: {query}
Answer: "#
    )
}
