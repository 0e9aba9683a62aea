//! TOML configuration.
//!
//! Every section is optional and every field has a default, so `lrag` runs
//! with no config file at all. Secrets are never read from TOML: the Qdrant
//! API key comes from `QDRANT_API_KEY` (or `--api-key`), with `.env` loaded
//! by `main` before this module is consulted.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::qdrant::Distance;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_embed_bind")]
    pub embed_bind: String,
    #[serde(default = "default_extract_bind")]
    pub extract_bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            embed_bind: default_embed_bind(),
            extract_bind: default_extract_bind(),
        }
    }
}

fn default_embed_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_extract_bind() -> String {
    "0.0.0.0:8001".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    /// Characters of extracted text returned before truncating with `...`.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_ocr_command")]
    pub ocr_command: String,
    #[serde(default)]
    pub ocr_lang: Option<String>,
    #[serde(default = "default_ocr_timeout_secs")]
    pub ocr_timeout_secs: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_text_chars: default_max_text_chars(),
            max_upload_bytes: default_max_upload_bytes(),
            ocr_command: default_ocr_command(),
            ocr_lang: None,
            ocr_timeout_secs: default_ocr_timeout_secs(),
        }
    }
}

fn default_max_text_chars() -> usize {
    2000
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}
fn default_ocr_command() -> String {
    "tesseract".to_string()
}
fn default_ocr_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_dims")]
    pub vector_size: usize,
    #[serde(default = "default_distance")]
    pub distance: Distance,
    #[serde(default = "default_qdrant_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub upsert_batch: usize,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
            vector_size: default_dims(),
            distance: default_distance(),
            timeout_secs: default_qdrant_timeout_secs(),
            upsert_batch: default_batch_size(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_collection() -> String {
    "docs".to_string()
}
fn default_distance() -> Distance {
    Distance::Cosine
}
fn default_qdrant_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    /// Base URL of the embedding service (`/embed` is appended).
    #[serde(default = "default_embed_url")]
    pub embed_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_loader_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            embed_url: default_embed_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_loader_timeout_secs(),
        }
    }
}

fn default_embed_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_loader_timeout_secs() -> u64 {
    60
}

/// Load and validate the config at `path`.
///
/// A missing file yields [`Config::default`]; a file that exists but fails to
/// parse or validate is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

/// Parse a TOML string into a [`Config`] without validating it.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn validate(config: &Config) -> Result<()> {
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    match crate::embedding::native_dims(&config.embedding.model) {
        None => bail!(
            "Unknown local embedding model: '{}'. Supported models: {}",
            config.embedding.model,
            crate::embedding::SUPPORTED_MODELS.join(", ")
        ),
        Some(native) if native != config.embedding.dims => bail!(
            "embedding.dims = {} but model '{}' produces {}-dimensional vectors",
            config.embedding.dims,
            config.embedding.model,
            native
        ),
        Some(_) => {}
    }

    if config.extract.max_text_chars == 0 {
        bail!("extract.max_text_chars must be > 0");
    }
    if config.extract.max_upload_bytes == 0 {
        bail!("extract.max_upload_bytes must be > 0");
    }

    if config.qdrant.vector_size == 0 {
        bail!("qdrant.vector_size must be > 0");
    }
    if config.qdrant.collection.trim().is_empty() {
        bail!("qdrant.collection must not be empty");
    }
    if !is_valid_collection_name(&config.qdrant.collection) {
        bail!(
            "qdrant.collection '{}' may only contain ASCII letters, digits, '-', '_' and '.'",
            config.qdrant.collection
        );
    }
    if config.qdrant.upsert_batch == 0 {
        bail!("qdrant.upsert_batch must be > 0");
    }

    if config.loader.batch_size == 0 {
        bail!("loader.batch_size must be > 0");
    }

    Ok(())
}

/// Collection names go into URL paths unencoded.
fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && name != "."
        && name != ".."
}
