use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// Request counters keyed by endpoint key.
pub type Hits = Arc<RwLock<HashMap<String, u32>>>;

/// Query parameters for `/flaky/{key}`.
#[derive(Debug, Deserialize)]
pub struct FailureScript {
    #[serde(default)]
    pub failures: u32,
    #[serde(default = "default_failure_status")]
    pub status: u16,
}

/// Query parameters for `/rate-limited/{key}`.
#[derive(Debug, Deserialize)]
pub struct RateLimitScript {
    #[serde(default = "default_rate_limit_failures")]
    pub failures: u32,
    #[serde(default)]
    pub retry_after: u64,
}

#[derive(Debug, Deserialize)]
pub struct Delay {
    #[serde(default)]
    pub ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitCount {
    pub key: String,
    pub hits: u32,
}

fn default_failure_status() -> u16 {
    503
}

fn default_rate_limit_failures() -> u32 {
    1
}

pub fn app() -> Router {
    let hits: Hits = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/status", get(status))
        .route("/status/{code}", any(status_code))
        .route("/flaky/{key}", any(flaky))
        .route("/rate-limited/{key}", any(rate_limited))
        .route("/hits/{key}", get(hit_count))
        .route("/slow", get(slow))
        .route("/echo", any(echo))
        .route("/text", get(text))
        .with_state(hits)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Increments the counter for `key` and returns the new value.
async fn record(hits: &Hits, key: &str) -> u32 {
    let mut hits = hits.write().await;
    let count = hits.entry(key.to_string()).or_insert(0);
    *count += 1;
    *count
}

async fn status() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status_code(State(hits): State<Hits>, Path(code): Path<u16>) -> Response {
    let Ok(status) = StatusCode::from_u16(code) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let hit = record(&hits, &format!("status-{code}")).await;
    (status, Json(json!({ "code": code, "hit": hit }))).into_response()
}

async fn flaky(
    State(hits): State<Hits>,
    Path(key): Path<String>,
    Query(script): Query<FailureScript>,
) -> Response {
    let hit = record(&hits, &key).await;
    if hit <= script.failures {
        let status = StatusCode::from_u16(script.status).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
        return (status, Json(json!({ "error": "scripted failure", "hit": hit }))).into_response();
    }
    Json(HitCount { key, hits: hit }).into_response()
}

async fn rate_limited(
    State(hits): State<Hits>,
    Path(key): Path<String>,
    Query(script): Query<RateLimitScript>,
) -> Response {
    let hit = record(&hits, &key).await;
    if hit <= script.failures {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, script.retry_after.to_string())],
            Json(json!({ "error": "slow down", "hit": hit })),
        )
            .into_response();
    }
    Json(HitCount { key, hits: hit }).into_response()
}

async fn hit_count(State(hits): State<Hits>, Path(key): Path<String>) -> Json<HitCount> {
    let hits = hits.read().await.get(&key).copied().unwrap_or(0);
    Json(HitCount { key, hits })
}

async fn slow(State(hits): State<Hits>, Query(delay): Query<Delay>) -> Json<Value> {
    record(&hits, "slow").await;
    tokio::time::sleep(Duration::from_millis(delay.ms)).await;
    Json(json!({ "status": "ok" }))
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> Json<Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body).unwrap_or(Value::String(body))
    };
    Json(json!({
        "method": method.as_str(),
        "contentType": content_type,
        "body": body,
    }))
}

async fn text() -> &'static str {
    "pong"
}
