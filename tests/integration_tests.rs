use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ask_gateway::config::Config;
use ask_gateway::create_app;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use envconfig::Envconfig;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio_test::assert_ok;
use tower::ServiceExt;

#[derive(Default)]
struct UpstreamHits {
    completions: AtomicUsize,
    health: AtomicUsize,
}

/// Minimal OpenAI-style backend: `/v1/chat/completions` echoes the user
/// message, `/slow` never answers in time, `/down` fails its health check.
async fn spawn_upstream() -> (String, Arc<UpstreamHits>) {
    async fn echo(
        State(hits): State<Arc<UpstreamHits>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        hits.completions.fetch_add(1, Ordering::SeqCst);

        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": { "message": "bad key" } })),
            );
        }

        let content = body["messages"][1]["content"].as_str().unwrap_or_default();
        (
            StatusCode::OK,
            Json(json!({
                "model": body["model"],
                "choices": [{ "message": { "role": "assistant", "content": format!("ECHO: {}", content) } }],
                "usage": { "prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7 }
            })),
        )
    }

    async fn slow(State(hits): State<Arc<UpstreamHits>>) -> Json<Value> {
        hits.completions.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        Json(json!({ "choices": [] }))
    }

    async fn healthy(State(hits): State<Arc<UpstreamHits>>) -> StatusCode {
        hits.health.fetch_add(1, Ordering::SeqCst);
        StatusCode::OK
    }

    async fn down(State(hits): State<Arc<UpstreamHits>>) -> StatusCode {
        hits.health.fetch_add(1, Ordering::SeqCst);
        StatusCode::SERVICE_UNAVAILABLE
    }

    let hits = Arc::new(UpstreamHits::default());
    let app = Router::new()
        .route("/v1/chat/completions", post(echo))
        .route("/slow", post(slow))
        .route("/health", get(healthy))
        .route("/down", get(down))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), hits)
}

fn config(pairs: &[(&str, String)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("API_KEY".to_string(), "gateway-key".to_string());
    vars.insert("UPSTREAM_API_KEY".to_string(), "sk-test".to_string());
    vars.insert("RETRY_DELAY_MS".to_string(), "1".to_string());
    for (key, value) in pairs {
        vars.insert(key.to_string(), value.clone());
    }
    Config::init_from_hashmap(&vars).unwrap()
}

fn ask(query: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/ask")
        .header("content-type", "application/json")
        .header("authorization", "Bearer gateway-key")
        .body(Body::from(json!({ "query": query }).to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_app(config(&[])).await.unwrap();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "api-gateway");
    assert_eq!(body["environment"], "production");
}

#[tokio::test]
async fn test_round_trip_through_http_upstream() {
    let (base, hits) = spawn_upstream().await;
    let app = create_app(config(&[(
        "UPSTREAM_URL",
        format!("{}/v1/chat/completions", base),
    )]))
    .await
    .unwrap();

    let response = app.oneshot(ask(json!("explain binary search"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "60");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "59");
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["response"], "ECHO: explain binary search");
    assert_eq!(body["metadata"]["source"], "upstream");
    assert_eq!(body["metadata"]["retryAttempts"], 0);
    assert_eq!(body["metadata"]["model"], "deepseek-coder");
    assert_eq!(body["metadata"]["tokens"]["total"], 7);
    assert_eq!(hits.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_process_alias_and_request_id_propagation() {
    let (base, _hits) = spawn_upstream().await;
    let app = create_app(config(&[(
        "UPSTREAM_URL",
        format!("{}/v1/chat/completions", base),
    )]))
    .await
    .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/process")
        .header("content-type", "application/json")
        .header("x-api-key", "gateway-key")
        .header("x-request-id", "trace-42")
        .body(Body::from(r#"{"query":"hello"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "trace-42");
    let body = body_json(response).await;
    assert_eq!(body["metadata"]["requestId"], "trace-42");
}

#[tokio::test]
async fn test_oversized_query_is_rejected_before_rate_limit() {
    let app = create_app(config(&[])).await.unwrap();

    let response = app.oneshot(ask(json!("a".repeat(1501)))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!response.headers().contains_key("x-ratelimit-remaining"));

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "BadRequest");
    assert_eq!(body["message"], "Query exceeds maximum length of 1500 characters");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = create_app(config(&[])).await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/ask")
        .header("content-type", "application/json")
        .header("authorization", "Bearer gateway-key")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "BadRequest");
}

#[tokio::test]
async fn test_missing_api_key_is_unauthorized() {
    let app = create_app(config(&[])).await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/ask")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query":"hello"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Invalid or missing API key");
}

#[tokio::test]
async fn test_rate_limit_exceeded() {
    let (base, hits) = spawn_upstream().await;
    let app = create_app(config(&[
        ("UPSTREAM_URL", format!("{}/v1/chat/completions", base)),
        ("RATE_LIMIT_MAX_REQUESTS", "2".to_string()),
    ]))
    .await
    .unwrap();

    for _ in 0..2 {
        let response = app.clone().oneshot(ask(json!("q"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.clone().oneshot(ask(json!("q"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0);
    assert_eq!(body_json(response).await["error"], "TooManyRequests");
    assert_eq!(hits.completions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_timeouts_are_retried_then_surface_as_unavailable_in_production() {
    let (base, hits) = spawn_upstream().await;
    let app = create_app(config(&[
        ("UPSTREAM_URL", format!("{}/slow", base)),
        ("UPSTREAM_TIMEOUT_MS", "50".to_string()),
        ("UPSTREAM_TIMEOUT_STEP_MS", "10".to_string()),
        ("MAX_RETRY_ATTEMPTS", "2".to_string()),
    ]))
    .await
    .unwrap();

    let response = app.oneshot(ask(json!("explain binary search"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "ServiceUnavailable");
    assert!(body.get("response").is_none());
    assert!(body.get("details").is_none());
    assert_eq!(hits.completions.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_development_degrades_to_fallback() {
    let (base, hits) = spawn_upstream().await;
    let app = create_app(config(&[
        ("APP_ENV", "development".to_string()),
        ("UPSTREAM_URL", format!("{}/slow", base)),
        ("UPSTREAM_TIMEOUT_MS", "50".to_string()),
        ("UPSTREAM_TIMEOUT_STEP_MS", "10".to_string()),
        ("MAX_RETRY_ATTEMPTS", "1".to_string()),
    ]))
    .await
    .unwrap();

    let response = app.oneshot(ask(json!("explain binary search"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["metadata"]["source"], "fallback");
    assert_eq!(body["metadata"]["retryAttempts"], 1);
    assert!(body["response"]
        .as_str()
        .unwrap()
        .contains("explain binary search"));
    assert_eq!(hits.completions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_health_probe_skips_completion() {
    let (base, hits) = spawn_upstream().await;
    let app = create_app(config(&[
        ("UPSTREAM_URL", format!("{}/v1/chat/completions", base)),
        ("UPSTREAM_HEALTH_URL", format!("{}/down", base)),
    ]))
    .await
    .unwrap();

    let response = app.oneshot(ask(json!("q"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(hits.health.load(Ordering::SeqCst), 1);
    assert_eq!(hits.completions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_passing_health_probe_runs_completion() {
    let (base, hits) = spawn_upstream().await;
    let app = create_app(config(&[
        ("UPSTREAM_URL", format!("{}/v1/chat/completions", base)),
        ("UPSTREAM_HEALTH_URL", format!("{}/health", base)),
    ]))
    .await
    .unwrap();

    let response = app.oneshot(ask(json!("q"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(hits.health.load(Ordering::SeqCst), 1);
    assert_eq!(hits.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_upstream_auth_failure_is_masked_as_internal_error() {
    let (base, _hits) = spawn_upstream().await;
    let app = create_app(config(&[
        ("UPSTREAM_URL", format!("{}/v1/chat/completions", base)),
        ("UPSTREAM_API_KEY", "sk-wrong".to_string()),
    ]))
    .await
    .unwrap();

    let response = app.oneshot(ask(json!("q"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "InternalServerError");
    assert_eq!(body["message"], "bad key");
}

#[tokio::test]
async fn test_request_deadline_produces_single_timeout_envelope() {
    let (base, _hits) = spawn_upstream().await;
    let app = create_app(config(&[
        ("UPSTREAM_URL", format!("{}/slow", base)),
        ("UPSTREAM_TIMEOUT_MS", "5000".to_string()),
        ("REQUEST_TIMEOUT_MS", "100".to_string()),
    ]))
    .await
    .unwrap();

    let response =
        tokio::time::timeout(Duration::from_secs(1), app.clone().oneshot(ask(json!("q"))))
            .await
            .expect("gateway must answer before its deadline plus slack")
            .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "RequestTimeout");

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let metrics = body_json(response).await;
    assert_eq!(metrics["requests"]["timedOut"], 1);
    assert_eq!(metrics["requests"]["totalRequests"], 1);
}

#[tokio::test]
async fn test_unknown_route_returns_envelope() {
    let app = create_app(config(&[])).await.unwrap();

    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "NotFound");
    assert_eq!(body["message"], "Not Found - /nope");
}

#[tokio::test]
async fn test_unknown_route_has_details_in_development() {
    let app = create_app(config(&[("APP_ENV", "development".to_string())]))
        .await
        .unwrap();

    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_json(response).await["details"].is_string());
}

#[tokio::test]
async fn test_bracket_only_query_is_rejected() {
    let app = create_app(config(&[])).await.unwrap();

    let response = app.oneshot(ask(json!("<<>>"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!response.headers().contains_key("x-ratelimit-remaining"));
    assert_eq!(body_json(response).await["message"], "Query cannot be empty");
}

#[tokio::test]
async fn test_docs_and_metrics_endpoints() {
    let app = create_app(config(&[])).await.unwrap();

    let response = assert_ok!(
        app.clone()
            .oneshot(Request::builder().uri("/docs").body(Body::empty()).unwrap())
            .await
    );
    assert_eq!(response.status(), StatusCode::OK);
    let docs = body_json(response).await;
    assert!(docs["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["path"] == "/ask"));

    let _ = app.clone().oneshot(ask(json!(""))).await.unwrap();

    let response = assert_ok!(
        app.oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
    );
    assert_eq!(response.status(), StatusCode::OK);
    let metrics = body_json(response).await;
    assert_eq!(metrics["requests"]["totalRequests"], 1);
    assert_eq!(metrics["requests"]["rejected"], 1);
    assert_eq!(metrics["rateLimit"]["backend"], "memory");
}
