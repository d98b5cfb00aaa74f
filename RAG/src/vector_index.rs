use crate::embedding_service::{calculate_similarity, Embedder};
use crate::gemini_service::LlmClient;
use crate::models::*;
use crate::query_engine::QueryEngine;
use anyhow::{bail, Result};
use std::sync::Arc;

struct IndexEntry {
    filename: String,
    /// Carries its vector in `chunk.embedding`.
    chunk: DocumentChunk,
}

/// In-memory index of embedded chunks, searched by brute-force cosine similarity.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndex {
    /// Embeds every chunk of `documents` and keeps the vectors in memory.
    pub async fn from_documents(documents: Vec<Document>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let mut pending = Vec::new();
        for document in documents {
            for chunk in document.chunks {
                pending.push((document.filename.clone(), chunk));
            }
        }

        if pending.is_empty() {
            log::warn!("Building an empty vector index");
            return Ok(Self {
                entries: Vec::new(),
                embedder,
            });
        }

        let texts: Vec<String> = pending.iter().map(|(_, chunk)| chunk.content.clone()).collect();
        let embeddings = embedder.embed_documents(&texts).await?;

        if embeddings.len() != pending.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                pending.len()
            );
        }

        let entries = pending
            .into_iter()
            .zip(embeddings)
            .map(|((filename, mut chunk), embedding)| {
                chunk.embedding = Some(embedding);
                IndexEntry { filename, chunk }
            })
            .collect::<Vec<_>>();

        log::info!("Indexed {} chunks", entries.len());
        Ok(Self { entries, embedder })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns up to `top_k` chunks, most similar first.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed_query(query).await?;
        Ok(self.search(&query_embedding, top_k))
    }

    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(&IndexEntry, f32)> = self
            .entries
            .iter()
            .map(|entry| {
                let embedding = entry.chunk.embedding.as_deref().unwrap_or(&[]);
                (entry, calculate_similarity(query_embedding, embedding))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let results: Vec<ScoredChunk> = scored
            .into_iter()
            .take(top_k)
            .map(|(entry, score)| ScoredChunk {
                filename: entry.filename.clone(),
                chunk: entry.chunk.clone(),
                score,
            })
            .collect();

        log::info!("Found {} relevant chunks", results.len());
        results
    }

    pub fn as_query_engine(&self, llm: Arc<dyn LlmClient>, similarity_top_k: usize) -> QueryEngine<'_> {
        QueryEngine::new(self, llm, similarity_top_k)
    }
}
