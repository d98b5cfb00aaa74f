use crate::models::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, LazyLock};
use tempfile::NamedTempFile;
use tiktoken_rs::CoreBPE;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

static RE_HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\p{L})-\s*\n\s*(\p{Ll})").unwrap());
static RE_CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F\x{FFFD}]").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Turns an uploaded file into plain text.
#[async_trait]
pub trait FileLoader: Send + Sync {
    async fn load_text(&self, upload: &PdfUpload) -> Result<String>;
}

/// Writes the upload to a temporary `.pdf` file so path-based readers can consume it.
///
/// The file is removed when the returned handle is dropped.
pub fn stage_upload(upload: &PdfUpload) -> Result<NamedTempFile> {
    let mut staged = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".pdf")
        .tempfile()
        .context("failed to create temporary file for upload")?;

    staged
        .write_all(&upload.data)
        .with_context(|| format!("failed to stage upload '{}'", upload.filename))?;
    staged.flush()?;

    log::debug!(
        "Staged {} ({} bytes) at {}",
        upload.filename,
        upload.data.len(),
        staged.path().display()
    );
    Ok(staged)
}

/// Extracts text from PDF uploads with `pdf-extract`.
#[derive(Debug, Default)]
pub struct PdfLoader;

impl PdfLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileLoader for PdfLoader {
    async fn load_text(&self, upload: &PdfUpload) -> Result<String> {
        let staged = stage_upload(upload)?;
        let filename = upload.filename.clone();

        // pdf-extract is synchronous and may panic on malformed input.
        let text = tokio::task::spawn_blocking(move || {
            let text = pdf_extract::extract_text(staged.path());
            drop(staged);
            text
        })
        .await
        .map_err(|e| anyhow!("PDF extraction task failed for '{}': {}", filename, e))?
        .with_context(|| format!("failed to extract text from '{}'", filename))?;

        log::info!("Extracted {} characters from {}", text.len(), upload.filename);
        Ok(text)
    }
}

pub struct DocumentProcessor {
    loader: Arc<dyn FileLoader>,
    tokenizer: Arc<CoreBPE>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl DocumentProcessor {
    pub fn new(loader: Arc<dyn FileLoader>, chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let tokenizer = tiktoken_rs::cl100k_base().context("failed to load cl100k_base tokenizer")?;

        Ok(Self {
            loader,
            tokenizer: Arc::new(tokenizer),
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        })
    }

    pub async fn process_upload(&self, upload: &PdfUpload) -> Result<Document> {
        log::info!("Processing PDF: {}", upload.filename);

        let content = self.loader.load_text(upload).await?;
        let chunks = self.create_chunks(&content);

        if chunks.is_empty() {
            log::warn!("No text could be extracted from {}", upload.filename);
        }

        Ok(Document {
            id: Uuid::new_v4().to_string(),
            filename: upload.filename.clone(),
            content,
            chunks,
        })
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.encode_with_special_tokens(text).len()
    }

    /// Packs whole sentences into chunks of at most `chunk_size` tokens.
    ///
    /// Each new chunk starts with the trailing sentences of the previous one,
    /// up to `chunk_overlap` tokens. Sentences longer than the budget are
    /// broken at word boundaries first.
    pub fn create_chunks(&self, content: &str) -> Vec<DocumentChunk> {
        let cleaned = clean_text(content);

        let mut pieces = Vec::new();
        for sentence in segment_text_into_sentences(&cleaned) {
            let tokens = self.count_tokens(&sentence);
            if tokens > self.chunk_size {
                pieces.extend(self.split_long_sentence(&sentence));
            } else {
                pieces.push((sentence, tokens));
            }
        }

        let mut chunks = Vec::new();
        let mut window: VecDeque<(String, usize)> = VecDeque::new();
        let mut window_tokens = 0;

        for (sentence, tokens) in pieces {
            if window_tokens + tokens > self.chunk_size && !window.is_empty() {
                chunks.push(self.build_chunk(chunks.len(), &window, window_tokens));

                let mut keep = 0;
                let mut kept_tokens = 0;
                for (_, t) in window.iter().rev() {
                    if kept_tokens + t > self.chunk_overlap {
                        break;
                    }
                    kept_tokens += t;
                    keep += 1;
                }
                let evicted = window.len() - keep;
                window.drain(..evicted);
                window_tokens = kept_tokens;

                while window_tokens + tokens > self.chunk_size {
                    match window.pop_front() {
                        Some((_, t)) => window_tokens -= t,
                        None => break,
                    }
                }
            }

            window_tokens += tokens;
            window.push_back((sentence, tokens));
        }

        if !window.is_empty() {
            chunks.push(self.build_chunk(chunks.len(), &window, window_tokens));
        }

        log::info!("Created {} chunks", chunks.len());
        chunks
    }

    fn build_chunk(&self, index: usize, window: &VecDeque<(String, usize)>, tokens: usize) -> DocumentChunk {
        let content = window
            .iter()
            .map(|(s, _)| s.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        DocumentChunk {
            id: Uuid::new_v4().to_string(),
            chunk_index: index,
            content,
            token_count: tokens,
            embedding: None,
        }
    }

    fn split_long_sentence(&self, sentence: &str) -> Vec<(String, usize)> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0;

        for word in sentence.split_whitespace() {
            let word_tokens = self.count_tokens(&format!(" {}", word));
            if word_tokens > self.chunk_size {
                if !current.is_empty() {
                    parts.push((std::mem::take(&mut current), current_tokens));
                    current_tokens = 0;
                }
                parts.extend(self.split_long_word(word));
                continue;
            }
            if current_tokens + word_tokens > self.chunk_size && !current.is_empty() {
                parts.push((std::mem::take(&mut current), current_tokens));
                current_tokens = 0;
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_tokens += word_tokens;
        }

        if !current.is_empty() {
            parts.push((current, current_tokens));
        }
        parts
    }

    /// Cuts a run without whitespace (CJK text, base64, table dumps) into
    /// token ranges of at most `chunk_size`. A range that would end inside a
    /// multi-byte character is shortened until it decodes.
    fn split_long_word(&self, word: &str) -> Vec<(String, usize)> {
        let tokens = self.tokenizer.encode_with_special_tokens(word);
        let mut parts = Vec::new();
        let mut start = 0;

        while start < tokens.len() {
            let limit = (start + self.chunk_size).min(tokens.len());
            let decoded = (start + 1..=limit)
                .rev()
                .chain(limit + 1..=tokens.len())
                .find_map(|end| {
                    self.tokenizer
                        .decode(tokens[start..end].to_vec())
                        .ok()
                        .map(|text| (text, end))
                });

            match decoded {
                Some((text, end)) => {
                    parts.push((text, end - start));
                    start = end;
                }
                None => {
                    log::warn!("Dropping {} undecodable tokens", tokens.len() - start);
                    break;
                }
            }
        }
        parts
    }
}

/// Rejoins words hyphenated across line breaks, then folds control
/// characters and whitespace runs into single spaces.
pub fn clean_text(text: &str) -> String {
    let cleaned = RE_HYPHEN_BREAK.replace_all(text, "$1$2");
    let cleaned = RE_CONTROL.replace_all(&cleaned, " ");
    let cleaned = RE_WHITESPACE.replace_all(&cleaned, " ");

    cleaned.trim().to_string()
}

pub fn segment_text_into_sentences(text: &str) -> Vec<String> {
    text.unicode_sentences()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
