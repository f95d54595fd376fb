//! Upstream client tests against a scripted in-process mock: the 429 retry
//! schedule, the error taxonomy, and the end-to-end tool-call path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use seo_mcp_gateway::config::Config;
use seo_mcp_gateway::state::AppState;
use seo_mcp_gateway::upstream::{Payload, UpstreamClient, UpstreamError};

/// Backoff base for tests: the production 1 s schedule shrinks to 20/40/80 ms.
const TEST_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Clone)]
struct MockUpstream {
    /// Scripted responses, consumed front to back. When the script runs dry
    /// the mock answers 200 with a credits payload.
    script: Arc<Mutex<VecDeque<(u16, Value)>>>,
    hits: Arc<AtomicUsize>,
}

async fn mock_handler(State(mock): State<MockUpstream>) -> axum::response::Response {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    let next = mock.script.lock().unwrap().pop_front();
    let (status, body) = next.unwrap_or((200, json!({ "data": [1000] })));
    (
        StatusCode::from_u16(status).unwrap(),
        Json(body),
    )
        .into_response()
}

/// Bind the mock on an ephemeral port and return (base_url, hit counter).
async fn spawn_mock(script: Vec<(u16, Value)>) -> (url::Url, Arc<AtomicUsize>) {
    let mock = MockUpstream {
        script: Arc::new(Mutex::new(script.into())),
        hits: Arc::new(AtomicUsize::new(0)),
    };
    let hits = mock.hits.clone();

    let router = axum::Router::new().fallback(mock_handler).with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}/", addr).parse().unwrap(), hits)
}

fn client(base_url: url::Url) -> UpstreamClient {
    UpstreamClient::new(reqwest::Client::new(), base_url).with_backoff_base(TEST_BACKOFF)
}

// ═══════════════════════════════════════════════════════════════════════════
//  retry schedule
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn two_429s_then_success_recovers_with_two_retries() {
    let (base, hits) = spawn_mock(vec![
        (429, json!({})),
        (429, json!({})),
        (200, json!({ "data": [42] })),
    ])
    .await;
    let upstream = client(base);

    let started = Instant::now();
    let result = upstream
        .call("credits", &Payload::None, Some("key"))
        .await
        .expect("third attempt succeeds");
    let elapsed = started.elapsed();

    assert_eq!(result["data"][0], 42);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    // backoff before each retry: base + 2*base = 3 base units minimum
    assert!(
        elapsed >= TEST_BACKOFF * 3,
        "backoff too short: {:?}",
        elapsed
    );
}

#[tokio::test]
async fn persistent_429s_exhaust_exactly_three_retries() {
    let (base, hits) = spawn_mock(vec![
        (429, json!({})),
        (429, json!({})),
        (429, json!({})),
        (429, json!({})),
    ])
    .await;
    let upstream = client(base);

    let err = upstream
        .call("credits", &Payload::None, Some("key"))
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::RateLimited));
    // initial attempt + 3 retries, nothing more
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

// ═══════════════════════════════════════════════════════════════════════════
//  error taxonomy
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn unauthorized_is_terminal_with_a_fixed_message() {
    let (base, hits) = spawn_mock(vec![(401, json!({ "message": "bad key" }))]).await;
    let err = client(base)
        .call("credits", &Payload::None, Some("key"))
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Unauthorized));
    // no upstream message passthrough, no retry
    assert!(!err.to_string().contains("bad key"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bad_request_passes_the_message_through_with_quota_guidance() {
    let (base, _) = spawn_mock(vec![(
        400,
        json!({ "message": "You do not have enough credits for this request" }),
    )])
    .await;
    let err = client(base)
        .call("get_related_keywords", &Payload::Json(json!({})), Some("key"))
        .await
        .unwrap_err();

    match err {
        UpstreamError::BadRequest(msg) => {
            assert!(msg.contains("enough credits"));
            assert!(msg.contains("get_credits"), "guidance missing: {}", msg);
        }
        other => panic!("expected BadRequest, got {:?}", other),
    }
}

#[tokio::test]
async fn other_statuses_become_generic_api_errors() {
    let (base, hits) = spawn_mock(vec![(503, json!({ "error": "maintenance window" }))]).await;
    let err = client(base)
        .call("credits", &Payload::None, Some("key"))
        .await
        .unwrap_err();

    match err {
        UpstreamError::Api { status, message } => {
            assert_eq!(status, "503");
            assert_eq!(message, "maintenance window");
        }
        other => panic!("expected Api, got {:?}", other),
    }
    // 503 is not retried
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_credential_never_reaches_the_network() {
    let (base, hits) = spawn_mock(vec![]).await;
    let err = client(base)
        .call("credits", &Payload::None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::MissingApiKey));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
//  end-to-end through the gateway
// ═══════════════════════════════════════════════════════════════════════════

async fn gateway_state(base_url: url::Url) -> AppState {
    let config = Config {
        port: 0,
        default_api_key: Some("test-key".to_string()),
        upstream_base_url: base_url.clone(),
        usage_file: std::env::temp_dir().join(format!("usage-{}.json", uuid::Uuid::new_v4())),
        session_ttl: None,
    };
    let state = AppState::new(config).await;
    let upstream = UpstreamClient::new(reqwest::Client::new(), base_url)
        .with_backoff_base(TEST_BACKOFF);
    state.with_upstream(upstream)
}

async fn call_tool(state: &AppState, session: &str, tool: &str, arguments: Value) -> Value {
    let body = json!({
        "jsonrpc": "2.0", "id": 2, "method": "tools/call",
        "params": { "name": tool, "arguments": arguments }
    });
    let response = seo_mcp_gateway::create_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .header("mcp-session-id", session)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn initialize(state: &AppState) -> String {
    let response = seo_mcp_gateway::create_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    response
        .headers()
        .get("mcp-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn tool_call_survives_transient_rate_limiting() {
    let (base, hits) = spawn_mock(vec![
        (429, json!({})),
        (429, json!({})),
        (200, json!({ "data": [98765] })),
    ])
    .await;
    let state = gateway_state(base).await;
    let session = initialize(&state).await;

    let body = call_tool(&state, &session, "get_credits", json!({})).await;
    assert_eq!(body["result"]["isError"], false);
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert_eq!(text, "Remaining API credits: 98,765");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn simulated_401_surfaces_as_error_content_not_protocol_error() {
    let (base, _) = spawn_mock(vec![(401, json!({}))]).await;
    let state = gateway_state(base).await;
    let session = initialize(&state).await;

    let body = call_tool(&state, &session, "get_credits", json!({})).await;
    assert!(body.get("error").is_none());
    assert_eq!(body["result"]["isError"], true);
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Authentication failed"), "got: {}", text);
}

#[tokio::test]
async fn formatted_keyword_volume_flows_through() {
    let payload = json!({
        "data": [{
            "keyword": "rust async",
            "vol": 12100,
            "cpc": { "currency": "$", "value": "1.85" },
            "competition": 0.41
        }]
    });
    let (base, _) = spawn_mock(vec![(200, payload)]).await;
    let state = gateway_state(base).await;
    let session = initialize(&state).await;

    let body = call_tool(
        &state,
        &session,
        "get_keyword_volume",
        json!({ "keywords": ["rust async"] }),
    )
    .await;
    assert_eq!(body["result"]["isError"], false);
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("rust async"));
    assert!(text.contains("12,100/mo"));
}

#[tokio::test]
async fn missing_required_argument_is_a_tool_error() {
    let (base, hits) = spawn_mock(vec![]).await;
    let state = gateway_state(base).await;
    let session = initialize(&state).await;

    let body = call_tool(&state, &session, "get_related_keywords", json!({})).await;
    assert_eq!(body["result"]["isError"], true);
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("keyword"));
    // argument validation fails before any upstream traffic
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
