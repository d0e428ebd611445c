//! Shared helpers: a mock embedding service served by axum on a free port.

#![allow(dead_code)]

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

pub const DIMS: usize = 384;
pub const API_KEY: &str = "test-key";

/// Bag-of-words vector: each word bumps one bucket, the last bucket is a
/// constant so no vector is ever zero.
pub fn word_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
            % (DIMS - 1);
        v[bucket] += 1.0;
    }
    v[DIMS - 1] = 0.1;
    v
}

fn inputs(body: &Value) -> Vec<String> {
    match &body["input"] {
        Value::Array(items) => items
            .iter()
            .filter_map(|i| i.as_str().map(String::from))
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", API_KEY))
        .unwrap_or(false)
}

/// OpenAI style, requires the bearer key and answers in reverse order.
async fn openai(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or bad key" })),
        );
    }
    let data: Vec<Value> = inputs(&body)
        .iter()
        .enumerate()
        .rev()
        .map(|(i, text)| json!({ "embedding": word_vector(text), "index": i }))
        .collect();
    (StatusCode::OK, Json(json!({ "data": data })))
}

/// Ollama style, no auth, vectors in input order. Requires exactly one
/// `content-type: application/json` header.
async fn ollama(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let content_types: Vec<_> = headers.get_all("content-type").iter().collect();
    if content_types.len() != 1 || *content_types[0] != "application/json" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("content-type headers: {:?}", content_types) })),
        );
    }
    let embeddings: Vec<Vec<f32>> = inputs(&body).iter().map(|t| word_vector(t)).collect();
    (StatusCode::OK, Json(json!({ "embeddings": embeddings })))
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "model exploded")
}

async fn garbage() -> &'static str {
    "this is not json"
}

async fn short() -> Json<Value> {
    Json(json!({ "data": [ { "embedding": [1.0, 2.0], "index": 0 } ] }))
}

async fn out_of_range() -> Json<Value> {
    Json(json!({ "data": [
        { "embedding": [1.0], "index": 0 },
        { "embedding": [1.0], "index": 5 }
    ] }))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    Json(json!({ "embeddings": [[1.0]] }))
}

pub struct MockEmbeddingServer {
    base: String,
}

impl MockEmbeddingServer {
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/v1/embeddings", post(openai))
            .route("/api/embed", post(ollama))
            .route("/broken", post(broken))
            .route("/garbage", post(garbage))
            .route("/short", post(short))
            .route("/out-of-range", post(out_of_range))
            .route("/slow", post(slow));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}
