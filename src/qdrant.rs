//! Minimal Qdrant REST client.
//!
//! Covers what the loader needs: check/create a collection, upsert points,
//! and run a similarity search. All calls go to `{url}/collections/...`;
//! when an API key is configured it is sent in the `api-key` header.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::QdrantConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
    Manhattan,
}

#[derive(Error, Debug)]
pub enum QdrantError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error(
        "collection '{name}' exists with incompatible vector params \
         (want size {size} / {distance:?})"
    )]
    IncompatibleCollection {
        name: String,
        size: usize,
        distance: Distance,
    },

    #[error("invalid api key header: {0}")]
    ApiKey(#[from] reqwest::header::InvalidHeaderValue),

    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Outcome of [`QdrantClient::ensure_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Created,
    Existing,
}

/// Qdrant point id: unsigned integer or UUID string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointId::Num(n) => write!(f, "{}", n),
            PointId::Uuid(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PointStruct {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl ScoredPoint {
    /// String payload field, if present.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.as_ref()?.get(key)?.as_str()
    }
}

#[derive(Clone)]
pub struct QdrantClient {
    http: reqwest::Client,
    base_url: String,
}

impl QdrantClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, QdrantError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(key)?;
            value.set_sensitive(true);
            headers.insert("api-key", value);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &QdrantConfig, api_key: Option<&str>) -> Result<Self, QdrantError> {
        Self::new(
            config.url.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{}", self.base_url, name)
    }

    /// Ensure a collection exists with the desired vectors config.
    /// - Create if missing
    /// - Validate (size, distance) if it exists
    pub async fn ensure_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<CollectionStatus, QdrantError> {
        match self.get_collection(name).await? {
            Some(info) => {
                if !info.matches(vector_size, distance) {
                    return Err(QdrantError::IncompatibleCollection {
                        name: name.to_string(),
                        size: vector_size,
                        distance,
                    });
                }
                Ok(CollectionStatus::Existing)
            }
            None => {
                self.create_collection(name, vector_size, distance).await?;
                Ok(CollectionStatus::Created)
            }
        }
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool, QdrantError> {
        Ok(self.get_collection(name).await?.is_some())
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>, QdrantError> {
        let resp = self.http.get(self.collection_url(name)).send().await?;

        match resp.status() {
            s if s.is_success() => {
                let body: GetCollectionResponse = resp.json().await?;
                Ok(Some(CollectionInfo::from_get_response(body)))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(QdrantError::Status { status, body })
            }
        }
    }

    pub async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<(), QdrantError> {
        let body = CreateCollectionRequest {
            vectors: VectorParams {
                size: vector_size,
                distance,
            },
        };
        tracing::debug!(collection = name, body = %serde_json::to_string(&body)?, "creating collection");

        let resp = self
            .http
            .put(self.collection_url(name))
            .json(&body)
            .send()
            .await?;
        check_status(resp).await.map(|_| ())
    }

    /// Upsert points in batches of `batch`, waiting for each batch to be applied.
    pub async fn upsert_points(
        &self,
        name: &str,
        points: &[PointStruct],
        batch: usize,
    ) -> Result<usize, QdrantError> {
        let url = format!("{}/points?wait=true", self.collection_url(name));
        let mut written = 0usize;

        for chunk in points.chunks(batch.max(1)) {
            let body = UpsertRequest { points: chunk };
            let resp = self.http.put(&url).json(&body).send().await?;
            check_status(resp).await?;
            written += chunk.len();
            tracing::debug!(collection = name, written, total = points.len(), "upserted batch");
        }

        Ok(written)
    }

    /// Nearest neighbours of `vector`, best first, with payloads.
    pub async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let url = format!("{}/points/search", self.collection_url(name));
        let body = SearchRequest {
            vector,
            limit,
            with_payload: true,
        };

        let resp = self.http.post(&url).json(&body).send().await?;
        let resp = check_status(resp).await?;
        let parsed: SearchResponse = resp.json().await?;
        Ok(parsed.result)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, QdrantError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(QdrantError::Status { status, body })
}

// Subset of the Qdrant REST models.

#[derive(Debug, Serialize)]
struct CreateCollectionRequest {
    vectors: VectorParams,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct VectorParams {
    size: usize,
    distance: Distance,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: &'a [PointStruct],
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct GetCollectionResponse {
    result: Option<CollectionResult>,
}

#[derive(Debug, Deserialize)]
struct CollectionResult {
    config: Option<CollectionConfig>,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: Option<CollectionParams>,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: Option<Value>,
}

/// Extracted/normalized info used for validation.
struct CollectionInfo {
    vectors: Option<VectorParams>,
}

impl CollectionInfo {
    fn from_get_response(resp: GetCollectionResponse) -> Self {
        // Named multi-vector configs do not parse as VectorParams and count as incompatible.
        let vectors = resp
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors)
            .and_then(|v| serde_json::from_value::<VectorParams>(v).ok());
        Self { vectors }
    }

    fn matches(&self, size: usize, distance: Distance) -> bool {
        match &self.vectors {
            Some(v) => v.size == size && v.distance == distance,
            None => false,
        }
    }
}
