//! Sentence embedding provider abstraction.
//!
//! Defines the [`EmbeddingProvider`] trait and the fastembed-backed
//! [`LocalProvider`] that the embedding service runs on. The model is loaded
//! once by [`create_provider`] and then shared by every request; inference
//! runs on Tokio's blocking pool so request handling stays responsive.
//!
//! Callers should go through [`embed_texts`], which short-circuits empty
//! input and checks that the provider returned one vector of the expected
//! length per text.
//!
//! # Models
//!
//! | Config name | Native dims |
//! |-------------|-------------|
//! | `all-minilm-l6-v2` (default) | 384 |
//! | `bge-small-en-v1.5` | 384 |
//! | `bge-base-en-v1.5` | 768 |
//! | `bge-large-en-v1.5` | 1024 |
//! | `nomic-embed-text-v1`, `nomic-embed-text-v1.5` | 768 |
//! | `multilingual-e5-small` | 384 |
//! | `multilingual-e5-base` | 768 |
//! | `multilingual-e5-large` | 1024 |

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::EmbeddingConfig;

/// Model names accepted in `embedding.model`.
pub const SUPPORTED_MODELS: &[&str] = &[
    "all-minilm-l6-v2",
    "bge-small-en-v1.5",
    "bge-base-en-v1.5",
    "bge-large-en-v1.5",
    "nomic-embed-text-v1",
    "nomic-embed-text-v1.5",
    "multilingual-e5-small",
    "multilingual-e5-base",
    "multilingual-e5-large",
];

/// Native output dimensionality of a supported model, or `None` if unknown.
pub fn native_dims(model_name: &str) -> Option<usize> {
    match model_name {
        "all-minilm-l6-v2" | "bge-small-en-v1.5" | "multilingual-e5-small" => Some(384),
        "bge-base-en-v1.5"
        | "nomic-embed-text-v1"
        | "nomic-embed-text-v1.5"
        | "multilingual-e5-base" => Some(768),
        "bge-large-en-v1.5" | "multilingual-e5-large" => Some(1024),
        _ => None,
    }
}

/// A backend that turns texts into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a non-empty batch. Output order matches input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a batch of texts and check the shape of the result.
///
/// # Errors
///
/// Fails if the provider fails, returns a different number of vectors than
/// texts, or returns a vector whose length differs from `provider.dims()`.
pub async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let vectors = provider.embed(texts).await?;

    if vectors.len() != texts.len() {
        bail!(
            "embedding count mismatch: sent {}, got {}",
            texts.len(),
            vectors.len()
        );
    }
    let expected = provider.dims();
    if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
        bail!(
            "embedding dimension mismatch: expected {}, got {}",
            expected,
            bad.len()
        );
    }

    Ok(vectors)
}

// ============ Local Provider (fastembed) ============

/// Embedding provider running a sentence-transformers model in-process.
///
/// Model weights are downloaded from Hugging Face on first use and cached;
/// afterwards no network access is needed.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    /// Load the configured model. Blocks while weights download and ORT initializes.
    pub fn load(config: &EmbeddingConfig) -> Result<Self> {
        let fastembed_model = config_to_fastembed_model(&config.model)?;

        tracing::info!(model = %config.model, "loading embedding model");
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: {}",
            other,
            SUPPORTED_MODELS.join(", ")
        ),
    }
}

/// Create the embedding provider described by `config`.
///
/// Model loading is blocking work, so it is moved off the async runtime.
///
/// # Errors
///
/// Returns an error if the model name is unknown, the model cannot be
/// downloaded or initialized, or the crate was built without
/// `local-embeddings-fastembed`.
pub async fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    #[cfg(feature = "local-embeddings-fastembed")]
    {
        let config = config.clone();
        let provider = tokio::task::spawn_blocking(move || LocalProvider::load(&config)).await??;
        Ok(Arc::new(provider))
    }
    #[cfg(not(feature = "local-embeddings-fastembed"))]
    {
        let _ = config;
        bail!("Local embedding provider requires --features local-embeddings-fastembed")
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
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
        return 0.0;
    }

    dot / denom
}
