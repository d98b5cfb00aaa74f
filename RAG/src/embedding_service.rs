use crate::config::RagConfig;
use crate::gemini_service::API_KEY_HEADER;
use crate::models::*;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rayon::prelude::*;
use reqwest::Client;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

/// Gemini accepts at most this many texts per batchEmbedContents call.
const MAX_BATCH_SIZE: usize = 100;

const DEFAULT_HASHING_DIMENSIONS: usize = 512;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>>;
}

pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(config: &RagConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.api_base_url.clone(),
            model: qualified_model_name(&config.embedding_model),
        })
    }

    fn content_request(&self, text: &str, task_type: &'static str) -> EmbedContentRequest {
        EmbedContentRequest {
            model: self.model.clone(),
            content: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
            task_type,
        }
    }

    async fn post<T, R>(&self, method: &str, body: &T) -> Result<R>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}:{}", self.base_url, self.model, method);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Gemini embedding API error ({}): {}", status, error_text));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let request = BatchEmbedContentsRequest {
                requests: batch
                    .iter()
                    .map(|text| self.content_request(text, "RETRIEVAL_DOCUMENT"))
                    .collect(),
            };

            let response: BatchEmbedContentsResponse =
                self.post("batchEmbedContents", &request).await?;

            if response.embeddings.len() != batch.len() {
                bail!(
                    "Gemini returned {} embeddings for {} texts",
                    response.embeddings.len(),
                    batch.len()
                );
            }
            embeddings.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        log::info!("Embedded {} chunks with {}", embeddings.len(), self.model);
        Ok(embeddings)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let request = self.content_request(query, "RETRIEVAL_QUERY");
        let response: EmbedContentResponse = self.post("embedContent", &request).await?;
        Ok(response.embedding.values)
    }
}

/// Offline embedder: hashes tokens into a fixed number of buckets and
/// weights them by term frequency.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];
        let words = tokenize(text);
        let total_words = words.len() as f32;

        for (word, count) in count_words(&words) {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let idx = (hasher.finish() % self.dimensions as u64) as usize;
            embedding[idx] += count as f32 / total_words;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in embedding.iter_mut() {
                *value /= norm;
            }
        }

        embedding
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.par_iter().map(|text| self.embed_text(text)).collect())
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(query))
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|word| word.chars().count() > 2)
        .collect()
}

fn count_words(words: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for word in words {
        *counts.entry(word.as_str()).or_insert(0) += 1;
    }
    counts
}

fn qualified_model_name(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

/// Cosine similarity over the shared prefix of both vectors; 0.0 when
/// either side has no magnitude.
pub fn calculate_similarity(embedding1: &[f32], embedding2: &[f32]) -> f32 {
    let min_len = embedding1.len().min(embedding2.len());

    let dot_product: f32 = embedding1[..min_len]
        .iter()
        .zip(embedding2[..min_len].iter())
        .map(|(a, b)| a * b)
        .sum();

    let norm1: f32 = embedding1[..min_len].iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm2: f32 = embedding2[..min_len].iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm1 == 0.0 || norm2 == 0.0 {
        0.0
    } else {
        dot_product / (norm1 * norm2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{GeminiStub, RecordedCall, STUB_API_KEY};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    fn batch_size(call: &RecordedCall) -> usize {
        call.body["requests"].as_array().map_or(0, |requests| requests.len())
    }

    fn embeddings_for(count: usize) -> Value {
        let embeddings: Vec<Value> = (0..count)
            .map(|i| json!({"values": [i as f32, 1.0]}))
            .collect();
        json!({ "embeddings": embeddings })
    }

    fn texts(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("chunk number {}", i)).collect()
    }

    #[test]
    fn test_similarity_identical_orthogonal_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let c = vec![-1.0, 0.0, 0.0];

        assert!((calculate_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(calculate_similarity(&a, &b).abs() < 1e-6);
        assert!((calculate_similarity(&a, &c) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_zero_vector() {
        assert_eq!(calculate_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(calculate_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let first = embedder.embed_query("The waiting period is thirty days").await.unwrap();
        let second = embedder.embed_query("The waiting period is thirty days").await.unwrap();

        assert_eq!(first.len(), 64);
        assert_eq!(first, second);
        let norm: f32 = first.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_embedder_ranks_related_text_higher() {
        let embedder = HashingEmbedder::default();
        let docs = vec![
            "Knee surgery is covered after a waiting period of two years.".to_string(),
            "The cafeteria serves lunch between noon and two.".to_string(),
        ];
        let vectors = embedder.embed_documents(&docs).await.unwrap();
        let query = embedder.embed_query("is knee surgery covered").await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert!(calculate_similarity(&query, &vectors[0]) > calculate_similarity(&query, &vectors[1]));
    }

    #[tokio::test]
    async fn test_hashing_embedder_empty_text() {
        let embedder = HashingEmbedder::new(16);
        let vector = embedder.embed_query("a an").await.unwrap();
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_batch_embedding_request_shape() {
        let embedder = GeminiEmbedder::new(&RagConfig::default()).unwrap();
        let request = BatchEmbedContentsRequest {
            requests: vec![embedder.content_request("hello", "RETRIEVAL_DOCUMENT")],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["requests"][0]["model"], "models/text-embedding-004");
        assert_eq!(json["requests"][0]["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(json["requests"][0]["content"]["parts"][0]["text"], "hello");
        assert!(json["requests"][0]["content"].get("role").is_none());
    }

    #[test]
    fn test_batch_embedding_response_parsing() {
        let body = r#"{"embeddings": [{"values": [0.1, 0.2]}, {"values": [0.3, 0.4]}]}"#;
        let response: BatchEmbedContentsResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[test]
    fn test_qualified_model_name() {
        assert_eq!(qualified_model_name("text-embedding-004"), "models/text-embedding-004");
        assert_eq!(qualified_model_name("models/embedding-001"), "models/embedding-001");
    }

    #[tokio::test]
    async fn test_embed_documents_batches_by_hundred() {
        let stub = GeminiStub::start(|call| (StatusCode::OK, embeddings_for(batch_size(call)))).await;
        let embedder = GeminiEmbedder::new(&stub.config()).unwrap();

        let vectors = embedder.embed_documents(&texts(150)).await.unwrap();

        assert_eq!(vectors.len(), 150);
        assert_eq!(vectors[100], vec![0.0, 1.0]);
        let calls = stub.calls();
        assert_eq!(calls.iter().map(batch_size).collect::<Vec<_>>(), vec![100, 50]);
        for call in &calls {
            assert_eq!(call.path, "/models/text-embedding-004:batchEmbedContents");
            assert_eq!(call.api_key.as_deref(), Some(STUB_API_KEY));
            assert!(call.query.is_none());
        }
        assert_eq!(calls[1].body["requests"][0]["content"]["parts"][0]["text"], "chunk number 100");
    }

    #[tokio::test]
    async fn test_short_batch_response_is_an_error() {
        let stub = GeminiStub::start(|call| {
            (StatusCode::OK, embeddings_for(batch_size(call).saturating_sub(1)))
        })
        .await;
        let embedder = GeminiEmbedder::new(&stub.config()).unwrap();

        let err = embedder.embed_documents(&texts(3)).await.unwrap_err();

        assert_eq!(err.to_string(), "Gemini returned 2 embeddings for 3 texts");
    }

    #[tokio::test]
    async fn test_embedding_api_error_reports_status_and_body() {
        let stub = GeminiStub::start(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": {"message": "backend unavailable"}}),
            )
        })
        .await;
        let embedder = GeminiEmbedder::new(&stub.config()).unwrap();

        let err = embedder.embed_documents(&texts(1)).await.unwrap_err().to_string();

        assert!(err.starts_with("Gemini embedding API error (500"));
        assert!(err.contains("backend unavailable"));
    }

    #[tokio::test]
    async fn test_embed_query_uses_embed_content() {
        let stub = GeminiStub::start(|_| (StatusCode::OK, json!({"embedding": {"values": [0.6, 0.8]}}))).await;
        let embedder = GeminiEmbedder::new(&stub.config()).unwrap();

        let vector = embedder.embed_query("is dental covered").await.unwrap();

        assert_eq!(vector, vec![0.6, 0.8]);
        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/models/text-embedding-004:embedContent");
        assert_eq!(calls[0].body["taskType"], "RETRIEVAL_QUERY");
    }
}
