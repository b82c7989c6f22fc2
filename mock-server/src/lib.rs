//! Fixture HTTP server for exercising the client end to end.
//!
//! Each route serves one kind of response the client has to cope with:
//! bodies in every supported format, arbitrary statuses, slow responses,
//! transient failures, and bodies that do not match their content type.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};

pub const ITEMS: [&str; 5] = ["apple", "apricot", "avocado", "banana", "cherry"];

/// Hit counts for `/flaky/{key}/{failures}`.
pub type Counters = Arc<RwLock<HashMap<String, u32>>>;

/// What `/echo` saw.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Echo {
    pub method: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub body: String,
}

pub fn app() -> Router {
    let counters: Counters = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/items", get(list_items))
        .route("/echo", any(echo))
        .route("/edn", get(edn))
        .route("/transit", get(transit))
        .route("/text", get(text))
        .route("/html", get(html))
        .route("/binary", get(binary))
        .route("/garbage", get(garbage))
        .route("/prefixed", get(prefixed))
        .route("/status/{code}", any(status))
        .route("/slow/{ms}", get(slow))
        .route("/flaky/{key}/{failures}", any(flaky))
        .with_state(counters)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Items starting with `q`, or all of them.
async fn list_items(Query(query): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    let q = query.get("q").cloned().unwrap_or_default();
    let items: Vec<&str> = ITEMS.iter().copied().filter(|item| item.starts_with(q.as_str())).collect();
    Json(json!({ "q": q, "items": items }))
}

async fn echo(
    method: Method,
    uri: axum::http::Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        query: uri.query().map(str::to_string),
        content_type: header_str(&headers, header::CONTENT_TYPE),
        accept: header_str(&headers, header::ACCEPT),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn edn() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/edn")],
        r#"{:name "edn", :tags #{:a}, :n 42}"#,
    )
}

async fn transit() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/transit+json")],
        r#"["^ ","~:name","transit","~:ids",[1,2]]"#,
    )
}

async fn text() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "hello")
}

async fn html() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html")], "<p>hello</p>")
}

async fn binary() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], vec![0x89u8, 0x50, 0x4e, 0x47])
}

async fn garbage() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], "not json {")
}

async fn prefixed() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"while(1);{"ok":true}"#,
    )
}

/// Respond with the given status and a small JSON body.
async fn status(Path(code): Path<u16>) -> impl IntoResponse {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(json!({ "status": status.as_u16() })))
}

async fn slow(Path(ms): Path<u64>) -> impl IntoResponse {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    ([(header::CONTENT_TYPE, "text/plain")], "done")
}

/// 503 for the first `failures` hits on `key`, then 200.
async fn flaky(
    State(counters): State<Counters>,
    Path((key, failures)): Path<(String, u32)>,
) -> impl IntoResponse {
    let attempt = {
        let mut counters = counters.write().await;
        let count = counters.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    };
    log::debug!("flaky {key}: attempt {attempt}");
    if attempt <= failures {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "attempt": attempt })))
    } else {
        (StatusCode::OK, Json(json!({ "attempt": attempt })))
    }
}
