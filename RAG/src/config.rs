use anyhow::{anyhow, bail, Context, Result};
use std::str::FromStr;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Remote Gemini embedding model.
    Gemini,
    /// Offline hashing embedder, no network access.
    Local,
}

impl FromStr for EmbeddingProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "local" | "hashing" => Ok(Self::Local),
            other => Err(anyhow!("unknown embedding provider '{}'", other)),
        }
    }
}

/// Model and retrieval settings shared by every request.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_provider: EmbeddingProvider,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Chunk budget, in tokens.
    pub chunk_size: usize,
    /// Tokens carried over from the end of one chunk into the next.
    pub chunk_overlap: usize,
    pub similarity_top_k: usize,
    pub request_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            chat_model: "gemini-2.5-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            embedding_provider: EmbeddingProvider::Gemini,
            temperature: 0.3,
            max_output_tokens: 1000,
            chunk_size: 1024,
            chunk_overlap: 200,
            similarity_top_k: 2,
            request_timeout_secs: 120,
        }
    }
}

impl RagConfig {
    /// Reads the configuration from the process environment (and `.env`).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.api_key = lookup("GOOGLE_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("GOOGLE_API_KEY environment variable not set"))?;

        if let Some(url) = lookup("GEMINI_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            config.chat_model = model;
        }
        if let Some(model) = lookup("GEMINI_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(provider) = lookup("EMBEDDING_PROVIDER") {
            config.embedding_provider = provider.parse()?;
        }

        parse_into(&lookup, "LLM_TEMPERATURE", &mut config.temperature)?;
        parse_into(&lookup, "LLM_MAX_OUTPUT_TOKENS", &mut config.max_output_tokens)?;
        parse_into(&lookup, "CHUNK_SIZE", &mut config.chunk_size)?;
        parse_into(&lookup, "CHUNK_OVERLAP", &mut config.chunk_overlap)?;
        parse_into(&lookup, "SIMILARITY_TOP_K", &mut config.similarity_top_k)?;
        parse_into(&lookup, "REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("CHUNK_SIZE must be greater than zero");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.similarity_top_k == 0 {
            bail!("SIMILARITY_TOP_K must be greater than zero");
        }
        Ok(())
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", key, raw))?;
    }
    Ok(())
}
