use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Document-level threshold: total embedded characters (page separators
    /// stripped) at or above which a PDF is treated as born-digital.
    #[serde(default = "default_min_embedded_chars")]
    pub min_embedded_chars: usize,
    #[serde(default = "default_ocr_dpi")]
    pub ocr_dpi: u32,
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_embedded_chars: default_min_embedded_chars(),
            ocr_dpi: default_ocr_dpi(),
            ocr_language: default_ocr_language(),
        }
    }
}

fn default_min_embedded_chars() -> usize {
    300
}
fn default_ocr_dpi() -> u32 {
    300
}
fn default_ocr_language() -> String {
    "eng".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"hash"` (deterministic, offline) or `"ollama"` (served model).
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Truncation budget applied before the provider sees the text,
    /// approximating the model's 512-token window.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Pages with cleaned text shorter than this are not embedded.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            dims: default_dims(),
            max_chars: default_max_chars(),
            min_chars: default_min_chars(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_max_chars() -> usize {
    2_000
}
fn default_min_chars() -> usize {
    50
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_weight")]
    pub semantic_weight: f64,
    /// Per-mode candidate pool size fetched before fusion.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: i64,
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
    #[serde(default = "default_snippet_context_chars")]
    pub snippet_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lexical_weight: default_weight(),
            semantic_weight: default_weight(),
            candidate_limit: default_candidate_limit(),
            snippet_max_chars: default_snippet_max_chars(),
            snippet_context_chars: default_snippet_context_chars(),
        }
    }
}

fn default_weight() -> f64 {
    0.5
}
fn default_candidate_limit() -> i64 {
    200
}
fn default_snippet_max_chars() -> usize {
    300
}
fn default_snippet_context_chars() -> usize {
    100
}

impl Config {
    /// A configuration with defaults everywhere and the given database path.
    /// Used by tests and bootstrap tooling.
    pub fn for_database(path: PathBuf) -> Self {
        Self {
            db: DbConfig { path },
            extraction: ExtractionConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.extraction.min_embedded_chars == 0 {
        anyhow::bail!("extraction.min_embedded_chars must be > 0");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.min_chars >= config.embedding.max_chars {
        anyhow::bail!("embedding.min_chars must be < embedding.max_chars");
    }
    match config.embedding.provider.as_str() {
        "hash" => {}
        "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'ollama'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash or ollama.",
            other
        ),
    }

    if config.retrieval.lexical_weight < 0.0 || config.retrieval.semantic_weight < 0.0 {
        anyhow::bail!("retrieval weights must be >= 0");
    }
    if config.retrieval.candidate_limit < 1 {
        anyhow::bail!("retrieval.candidate_limit must be >= 1");
    }
    if config.retrieval.snippet_max_chars == 0 {
        anyhow::bail!("retrieval.snippet_max_chars must be > 0");
    }

    Ok(config)
}
