use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Echo};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

fn content_type(response: &axum::response::Response) -> &str {
    response.headers()[http::header::CONTENT_TYPE].to_str().unwrap()
}

// --- items ---

#[tokio::test]
async fn items_filter_by_prefix() {
    let resp = app().oneshot(get("/items?q=ap")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(content_type(&resp), "application/json");
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["q"], "ap");
    assert_eq!(body["items"], serde_json::json!(["apple", "apricot"]));
}

#[tokio::test]
async fn items_without_query_lists_everything() {
    let resp = app().oneshot(get("/items")).await.unwrap();
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["items"].as_array().unwrap().len(), mock_server::ITEMS.len());
}

// --- echo ---

#[tokio::test]
async fn echo_reports_method_headers_and_body() {
    let req = Request::builder()
        .method("PUT")
        .uri("/echo?x=1")
        .header(http::header::CONTENT_TYPE, "application/edn")
        .header(http::header::ACCEPT, "application/json")
        .body("{:a 1}".to_string())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(
        echo,
        Echo {
            method: "PUT".to_string(),
            query: Some("x=1".to_string()),
            content_type: Some("application/edn".to_string()),
            accept: Some("application/json".to_string()),
            body: "{:a 1}".to_string(),
        }
    );
}

#[tokio::test]
async fn echo_accepts_custom_methods() {
    let req = Request::builder()
        .method("PATCH")
        .uri("/echo")
        .body(String::new())
        .unwrap();
    let echo: Echo = body_json(app().oneshot(req).await.unwrap()).await;
    assert_eq!(echo.method, "PATCH");
    assert!(echo.body.is_empty());
}

// --- formats ---

#[tokio::test]
async fn format_routes_set_their_content_types() {
    for (uri, expected) in [
        ("/edn", "application/edn"),
        ("/transit", "application/transit+json"),
        ("/text", "text/plain; charset=utf-8"),
        ("/html", "text/html"),
        ("/binary", "image/png"),
        ("/garbage", "application/json"),
        ("/prefixed", "application/json"),
    ] {
        let resp = app().oneshot(get(uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{uri}");
        assert_eq!(content_type(&resp), expected, "{uri}");
    }
}

#[tokio::test]
async fn prefixed_body_starts_with_guard() {
    let resp = app().oneshot(get("/prefixed")).await.unwrap();
    let bytes = body_bytes(resp).await;
    assert!(bytes.starts_with(b"while(1);"));
}

// --- status ---

#[tokio::test]
async fn status_route_returns_requested_status() {
    let resp = app().oneshot(get("/status/418")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["status"], 418);
}

#[tokio::test]
async fn status_route_rejects_nonsense() {
    let resp = app().oneshot(get("/status/abc")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- slow ---

#[tokio::test]
async fn slow_route_eventually_answers() {
    let resp = app().oneshot(get("/slow/10")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(&body_bytes(resp).await[..], b"done");
}

// --- flaky ---

#[tokio::test]
async fn flaky_fails_then_recovers() {
    let app = app();

    for expected in [StatusCode::SERVICE_UNAVAILABLE, StatusCode::SERVICE_UNAVAILABLE, StatusCode::OK] {
        let resp = app.clone().oneshot(get("/flaky/k/2")).await.unwrap();
        assert_eq!(resp.status(), expected);
    }

    // Keys are counted independently.
    let resp = app.clone().oneshot(get("/flaky/other/1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["attempt"], 1);
}
