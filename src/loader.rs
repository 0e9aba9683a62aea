//! One-shot loader: embed texts through the embedding service, upsert them
//! into Qdrant, then run a test search.
//!
//! Each text becomes a point `{id: start_id + i, vector, payload: {"text": ...}}`.
//! Re-running with the same ids overwrites the earlier points.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;

use crate::config::Config;
use crate::embed_client::EmbedClient;
use crate::qdrant::{CollectionStatus, PointId, PointStruct, QdrantClient, ScoredPoint};

/// Texts loaded when neither `--text` nor `--file` is given.
pub const SAMPLE_TEXTS: &[&str] = &["The quick brown fox", "A lazy dog"];
pub const DEFAULT_QUERY: &str = "fast fox";
pub const DEFAULT_LIMIT: usize = 2;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub texts: Vec<String>,
    pub file: Option<PathBuf>,
    pub query: String,
    pub limit: usize,
    pub start_id: u64,
    pub search: bool,
    pub api_key: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            texts: Vec::new(),
            file: None,
            query: DEFAULT_QUERY.to_string(),
            limit: DEFAULT_LIMIT,
            start_id: 0,
            search: true,
            api_key: None,
        }
    }
}

/// Summary of a load run, also used by tests.
#[derive(Debug)]
pub struct LoadReport {
    pub collection: String,
    pub status: CollectionStatus,
    pub inserted: usize,
    pub hits: Vec<ScoredPoint>,
}

fn require_api_key(api_key: Option<&str>) -> Result<&str> {
    match api_key {
        Some(k) if !k.trim().is_empty() => Ok(k),
        _ => bail!("QDRANT_API_KEY environment variable is not set"),
    }
}

/// Resolve the texts to load: explicit values, else file lines, else the sample.
pub fn resolve_texts(texts: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    if !texts.is_empty() {
        return Ok(texts.to_vec());
    }
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read texts file: {}", path.display()))?;
        let lines: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if lines.is_empty() {
            bail!("texts file {} contains no non-blank lines", path.display());
        }
        return Ok(lines);
    }
    Ok(SAMPLE_TEXTS.iter().map(|s| s.to_string()).collect())
}

/// Fail unless ids `start_id..start_id + count` all fit in a `u64`.
pub fn check_id_range(start_id: u64, count: usize) -> Result<()> {
    let last_offset = count.saturating_sub(1) as u64;
    if start_id.checked_add(last_offset).is_none() {
        bail!(
            "start id range overflows u64: {} + {} points",
            start_id,
            count
        );
    }
    Ok(())
}

/// Pair texts with vectors as Qdrant points with sequential ids.
pub fn build_points(
    texts: &[String],
    vectors: Vec<Vec<f32>>,
    start_id: u64,
) -> Result<Vec<PointStruct>> {
    texts
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (text, vector))| -> Result<PointStruct> {
            let id = start_id
                .checked_add(i as u64)
                .ok_or_else(|| anyhow!("start id range overflows u64 at offset {}", i))?;
            Ok(PointStruct {
                id: PointId::Num(id),
                vector,
                payload: json!({ "text": text }),
            })
        })
        .collect()
}

/// Embed, upsert and (optionally) search. Prints progress to stdout.
pub async fn run_load(config: &Config, opts: &LoadOptions) -> Result<LoadReport> {
    let api_key = require_api_key(opts.api_key.as_deref())?;
    let texts = resolve_texts(&opts.texts, opts.file.as_deref())?;
    check_id_range(opts.start_id, texts.len())?;
    let collection = config.qdrant.collection.as_str();

    let embedder = EmbedClient::from_config(&config.loader, Some(config.qdrant.vector_size))?;
    let vectors = embedder
        .embed_texts(&texts)
        .await
        .map_err(|e| anyhow!("Failed to get embeddings: {}", e))?;
    tracing::info!(texts = texts.len(), "embedded texts");

    let qdrant = QdrantClient::from_config(&config.qdrant, Some(api_key))?;
    let status = qdrant
        .ensure_collection(collection, config.qdrant.vector_size, config.qdrant.distance)
        .await
        .with_context(|| format!("Failed to prepare collection '{}'", collection))?;
    match status {
        CollectionStatus::Created => println!("Created new collection: {}", collection),
        CollectionStatus::Existing => println!("Collection '{}' already exists", collection),
    }

    let points = build_points(&texts, vectors, opts.start_id)?;
    let inserted = qdrant
        .upsert_points(collection, &points, config.qdrant.upsert_batch)
        .await
        .with_context(|| format!("Failed to upsert into '{}'", collection))?;
    println!(
        "Inserted {} points into Qdrant collection '{}'",
        inserted, collection
    );

    let hits = if opts.search {
        search_and_print(&embedder, &qdrant, collection, &opts.query, opts.limit).await?
    } else {
        Vec::new()
    };

    Ok(LoadReport {
        collection: collection.to_string(),
        status,
        inserted,
        hits,
    })
}

/// Embed `query` and print the nearest points in the configured collection.
pub async fn run_search(
    config: &Config,
    query: &str,
    limit: usize,
    api_key: Option<&str>,
) -> Result<Vec<ScoredPoint>> {
    let api_key = require_api_key(api_key)?;
    let embedder = EmbedClient::from_config(&config.loader, Some(config.qdrant.vector_size))?;
    let qdrant = QdrantClient::from_config(&config.qdrant, Some(api_key))?;
    search_and_print(&embedder, &qdrant, &config.qdrant.collection, query, limit).await
}

async fn search_and_print(
    embedder: &EmbedClient,
    qdrant: &QdrantClient,
    collection: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<ScoredPoint>> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }

    let qvec = embedder
        .embed_text(query)
        .await
        .map_err(|e| anyhow!("Failed to embed query: {}", e))?;
    let hits = qdrant
        .search(collection, &qvec, limit)
        .await
        .with_context(|| format!("Search in '{}' failed", collection))?;

    println!();
    println!("Search results for: {}", query);
    for hit in &hits {
        println!("{}", format_hit(hit));
    }
    Ok(hits)
}

pub fn format_hit(hit: &ScoredPoint) -> String {
    format!(
        "• Score={:.3} | Text={}",
        hit.score,
        hit.payload_str("text").unwrap_or("")
    )
}
