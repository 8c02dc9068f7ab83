//! Embedding provider abstraction and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] capability trait and two concrete
//! implementations:
//! - **[`HashProvider`]**: deterministic character-trigram hashing with L2
//!   normalization; fully offline, the default.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed`
//!   endpoint with exponential-backoff retry.
//!
//! [`EmbeddingGenerator`] wraps a provider with the policy layer: empty-text
//! rejection, the character truncation budget (~512 model tokens), and the
//! minimum-length gate used to skip near-empty pages.
//!
//! Vector helpers:
//! - [`cosine_similarity`]: similarity over equal-length vectors
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian f32 BLOB codec for
//!   SQLite storage
//! - [`chunk_text`]: eager overlapping chunks for long-document coverage

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// Capability interface for turning text into fixed-dimension vectors.
///
/// Implementations must be stateless with respect to individual calls so a
/// single instance can serve ingestion and query embedding concurrently.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Create the provider named by the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbedError> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashProvider::new(config.dims))),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => Err(EmbedError::Provider(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Hash Provider ============

/// Deterministic trigram-hashing embedder.
///
/// Lowercases the input, hashes every character trigram into a bucket, and
/// L2-normalizes the bucket counts. Inputs shorter than a trigram hash as a
/// single token so any non-empty text yields a non-zero vector.
pub struct HashProvider {
    dims: usize,
    name: String,
}

impl HashProvider {
    pub fn new(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            name: format!("hash-trigram-{}", dims.max(1)),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dims];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        if chars.len() < 3 {
            let bucket = (fnv1a(&lowered) % self.dims as u64) as usize;
            vector[bucket] = 1.0;
            return vector;
        }

        for window in chars.windows(3) {
            let token: String = window.iter().collect();
            let bucket = (fnv1a(&token) % self.dims as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash = 1469598103934665603u64;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

// ============ Ollama Provider ============

/// Embedding provider backed by a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). Transient failures (429, 5xx, connection
/// errors) are retried with exponential backoff: 1s, 2s, 4s, ... capped at
/// 2^5; other client errors fail immediately.
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let model = config.model.clone().ok_or_else(|| {
            EmbedError::Provider("embedding.model required for ollama provider".to_string())
        })?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims: config.dims,
            url,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/api/embed", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_ollama_response(&json, self.dims);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(EmbedError::Provider(format!(
                            "ollama API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EmbedError::Provider(format!(
                        "ollama API error {}: {}",
                        status, body_text
                    )));
                }
                Err(_) => {
                    last_err = Some(EmbedError::NotReady(format!(
                        "no ollama instance reachable at {}",
                        self.url
                    )));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EmbedError::Provider("embedding failed after retries".to_string())))
    }
}

fn parse_ollama_response(
    json: &serde_json::Value,
    dims: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            EmbedError::Provider("invalid ollama response: missing embeddings array".to_string())
        })?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| {
                EmbedError::Provider("invalid ollama response: embedding is not an array".to_string())
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vec.len() != dims {
            return Err(EmbedError::DimensionMismatch {
                left: dims,
                right: vec.len(),
            });
        }
        result.push(vec);
    }

    Ok(result)
}

// ============ Generator ============

/// Policy wrapper around an [`EmbeddingProvider`].
///
/// Applies the character truncation budget before the provider sees the
/// text, rejects empty input, and exposes the minimum-length gate used by
/// the ingestion pipeline to skip near-empty pages.
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    max_chars: usize,
    min_chars: usize,
}

impl EmbeddingGenerator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            max_chars: config.max_chars,
            min_chars: config.min_chars,
        }
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Whether a page's cleaned text is long enough to be worth embedding.
    /// Very short pages would pollute vector search with near-uniform noise.
    pub fn should_embed(&self, text: &str) -> bool {
        text.chars().count() >= self.min_chars
    }

    /// Embed one text. Fails on empty input; longer input is truncated to
    /// the configured character budget before embedding.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_batch(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::Provider("provider returned no vectors".to_string()))
    }

    /// Batch equivalent of [`embed`](Self::embed): per-item results are
    /// identical to individual calls.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.iter().any(|text| text.trim().is_empty()) {
            return Err(EmbedError::EmptyText);
        }

        let truncated: Vec<String> = texts
            .iter()
            .map(|text| truncate_chars(text, self.max_chars))
            .collect();

        let vectors = self.provider.embed_batch(&truncated).await?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::Provider(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// With L2-normalized inputs the result lies in `[-1.0, 1.0]`. Vectors of
/// different lengths cannot be compared and produce an error; a zero vector
/// yields `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, EmbedError> {
    if a.len() != b.len() {
        return Err(EmbedError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return Ok(0.0);
    }

    Ok(dot / denom)
}

/// Split text into eager overlapping chunks for downstream embedding of
/// long documents. `overlap` must be strictly less than `max_chunk_size` so
/// every step makes forward progress.
pub fn chunk_text(
    text: &str,
    max_chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, EmbedError> {
    if max_chunk_size == 0 {
        return Err(EmbedError::InvalidChunking(
            "max_chunk_size must be > 0".to_string(),
        ));
    }
    if overlap >= max_chunk_size {
        return Err(EmbedError::InvalidChunking(format!(
            "overlap ({}) must be < max_chunk_size ({})",
            overlap, max_chunk_size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let step = max_chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}
