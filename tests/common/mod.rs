//! Shared fakes for integration tests: a deterministic embedding provider and
//! an in-memory stand-in for the Qdrant REST API.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use local_rag::embedding::{cosine_similarity, EmbeddingProvider};

pub const DIMS: usize = 384;
pub const API_KEY: &str = "test-key";

/// Bag-of-words embedding: each lower-cased word bumps one bucket.
pub struct BagOfWords {
    pub dims: usize,
}

impl BagOfWords {
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let bucket = word.bytes().map(|b| b as usize).sum::<usize>() % self.dims;
            v[bucket] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Provider that always fails.
pub struct Broken;

#[async_trait]
impl EmbeddingProvider for Broken {
    fn model_name(&self) -> &str {
        "broken"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("model exploded")
    }
}

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[derive(Default)]
pub struct FakeQdrantState {
    /// name → (size, distance)
    pub collections: HashMap<String, (usize, String)>,
    /// name → id → (vector, payload)
    pub points: HashMap<String, HashMap<String, (Vec<f32>, Value)>>,
    pub create_calls: usize,
}

pub type SharedQdrant = Arc<Mutex<FakeQdrantState>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == API_KEY)
        .unwrap_or(false)
}

async fn get_collection(
    State(state): State<SharedQdrant>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let state = state.lock().unwrap();
    let (size, distance) = state.collections.get(&name).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({
        "result": {
            "status": "green",
            "config": { "params": { "vectors": { "size": size, "distance": distance } } }
        },
        "status": "ok",
        "time": 0.0
    })))
}

async fn create_collection(
    State(state): State<SharedQdrant>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let size = body["vectors"]["size"].as_u64().ok_or(StatusCode::BAD_REQUEST)? as usize;
    let distance = body["vectors"]["distance"]
        .as_str()
        .ok_or(StatusCode::BAD_REQUEST)?
        .to_string();
    let mut state = state.lock().unwrap();
    state.create_calls += 1;
    state.collections.insert(name, (size, distance));
    Ok(Json(json!({ "result": true, "status": "ok", "time": 0.0 })))
}

async fn upsert_points(
    State(state): State<SharedQdrant>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let mut state = state.lock().unwrap();
    let (size, _) = state
        .collections
        .get(&name)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)?;
    let points = body["points"].as_array().ok_or(StatusCode::BAD_REQUEST)?;
    let store = state.points.entry(name).or_default();
    for p in points {
        let vector: Vec<f32> =
            serde_json::from_value(p["vector"].clone()).map_err(|_| StatusCode::BAD_REQUEST)?;
        if vector.len() != size {
            return Err(StatusCode::BAD_REQUEST);
        }
        store.insert(p["id"].to_string(), (vector, p["payload"].clone()));
    }
    Ok(Json(json!({
        "result": { "operation_id": 0, "status": "completed" },
        "status": "ok"
    })))
}

async fn search_points(
    State(state): State<SharedQdrant>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let query: Vec<f32> =
        serde_json::from_value(body["vector"].clone()).map_err(|_| StatusCode::BAD_REQUEST)?;
    let limit = body["limit"].as_u64().unwrap_or(10) as usize;

    let state = state.lock().unwrap();
    let store = state.points.get(&name).ok_or(StatusCode::NOT_FOUND)?;
    let mut hits: Vec<Value> = store
        .iter()
        .map(|(id, (vector, payload))| {
            let id: Value = serde_json::from_str(id).unwrap();
            json!({
                "id": id,
                "version": 0,
                "score": cosine_similarity(&query, vector),
                "payload": payload,
            })
        })
        .collect();
    hits.sort_by(|a, b| {
        b["score"]
            .as_f64()
            .partial_cmp(&a["score"].as_f64())
            .unwrap()
    });
    hits.truncate(limit);
    Ok(Json(json!({ "result": hits, "status": "ok", "time": 0.0 })))
}

/// Router mimicking the subset of Qdrant's REST API the client uses.
pub fn fake_qdrant(state: SharedQdrant) -> Router {
    Router::new()
        .route(
            "/collections/{name}",
            get(get_collection).put(create_collection),
        )
        .route("/collections/{name}/points", put(upsert_points))
        .route("/collections/{name}/points/search", post(search_points))
        .with_state(state)
}
