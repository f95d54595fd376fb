//! HTTP transport for the MCP endpoint.
//!
//! One path, four verbs:
//! - `OPTIONS /mcp` - CORS preflight accommodation, always succeeds
//! - `GET /mcp` - static liveness payload, no session required
//! - `POST /mcp` - the RPC channel (single request or ordered batch)
//! - `DELETE /mcp` - explicit session termination
//!
//! Headers consumed: `MCP-Protocol-Version`, `Mcp-Session-Id`, and the
//! credential override (`X-Api-Key` header or `?api_key=` query parameter).
//! Responses to initialize-bearing requests carry `Mcp-Session-Id` back.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;
use crate::usage::UsageEvent;

use super::dispatch::{
    self, check_protocol_version, resolve_session, BatchElement, GateError, RequestContext,
};
use super::protocol::{
    rpc_error, RpcRequest, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, PARSE_ERROR,
    PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION,
};

pub const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
pub struct CredQuery {
    pub api_key: Option<String>,
}

// ── OPTIONS /mcp ────────────────────────────────────────────────────────────

pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

// ── GET /mcp ────────────────────────────────────────────────────────────────

/// Out-of-band liveness probe; no session or body required.
pub async fn liveness(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    record_http(&state, "GET", &headers);
    Json(json!({
        "status": "ok",
        "server": SERVER_NAME,
        "version": SERVER_VERSION,
        "protocolVersion": PROTOCOL_VERSION,
    }))
}

// ── POST /mcp ───────────────────────────────────────────────────────────────

/// The RPC channel. Processing runs inside a spawned task so a panic in any
/// handler is caught at this boundary and reported as -32603 instead of
/// tearing down the connection.
pub async fn rpc(
    State(state): State<AppState>,
    Query(query): Query<CredQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    record_http(&state, "POST", &headers);

    let handle = tokio::spawn(async move { process_rpc(state, query, headers, body).await });
    match handle.await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("rpc dispatch panicked: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(rpc_error(Value::Null, INTERNAL_ERROR, "Internal error")),
            )
                .into_response()
        }
    }
}

async fn process_rpc(
    state: AppState,
    query: CredQuery,
    headers: HeaderMap,
    body: String,
) -> Response {
    // Parse before anything else: a body we cannot read gets -32700.
    let parsed: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(rpc_error(
                    Value::Null,
                    PARSE_ERROR,
                    &format!("Parse error: {}", e),
                )),
            )
                .into_response();
        }
    };

    let is_batch = parsed.is_array();
    let elements: Vec<BatchElement> = match parsed {
        Value::Array(items) => {
            if items.is_empty() {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(rpc_error(Value::Null, INVALID_REQUEST, "Empty batch")),
                )
                    .into_response();
            }
            items
                .into_iter()
                .map(|item| match serde_json::from_value::<RpcRequest>(item) {
                    Ok(req) => BatchElement::Request(req),
                    Err(_) => BatchElement::Malformed,
                })
                .collect()
        }
        single => match serde_json::from_value::<RpcRequest>(single) {
            Ok(req) => vec![BatchElement::Request(req)],
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(rpc_error(
                        Value::Null,
                        INVALID_REQUEST,
                        "Request must be a JSON object or array",
                    )),
                )
                    .into_response();
            }
        },
    };

    // Step 1: protocol version gate, before any session work.
    let version = header_str(&headers, PROTOCOL_VERSION_HEADER);
    if let Err(gate) = check_protocol_version(version.as_deref()) {
        return gate_response(&elements, is_batch, gate);
    }

    // Step 2: session resolution - once per envelope, shared by every batch
    // element.
    let session_header = header_str(&headers, SESSION_HEADER);
    let wants_initialize = elements.iter().any(|e| match e {
        BatchElement::Request(r) => r.method() == "initialize",
        BatchElement::Malformed => false,
    });
    let (session_id, minted) = match resolve_session(
        &state.sessions,
        session_header.as_deref(),
        wants_initialize,
    )
    .await
    {
        Ok(resolved) => resolved,
        Err(gate) => return gate_response(&elements, is_batch, gate),
    };

    // Request-scoped credential: caller override beats the process default.
    let api_key = query
        .api_key
        .or_else(|| header_str(&headers, API_KEY_HEADER))
        .or_else(|| state.config.default_api_key.clone());

    let ctx = RequestContext {
        session_id,
        api_key,
        minted,
    };

    // Step 3: method dispatch.
    let replies = dispatch::dispatch_batch(&state, &ctx, &elements).await;

    let mut response = if replies.is_empty() {
        // Pure notifications: explicit no-body outcome.
        StatusCode::ACCEPTED.into_response()
    } else if is_batch {
        (StatusCode::OK, Json(Value::Array(replies))).into_response()
    } else {
        let reply = replies.into_iter().next().unwrap_or(Value::Null);
        (StatusCode::OK, Json(reply)).into_response()
    };

    if wants_initialize {
        attach_session_header(&mut response, &ctx.session_id);
    }
    response
}

// ── DELETE /mcp ─────────────────────────────────────────────────────────────

/// Explicit session termination. Distinguishes "was present and removed"
/// from "was absent" for correct status reporting; repeating the DELETE on
/// an already-gone id is a 404 both times.
pub async fn terminate(State(state): State<AppState>, headers: HeaderMap) -> Response {
    record_http(&state, "DELETE", &headers);

    let Some(session_id) = header_str(&headers, SESSION_HEADER) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(rpc_error(
                Value::Null,
                INVALID_PARAMS,
                "Missing Mcp-Session-Id header",
            )),
        )
            .into_response();
    };

    if state.sessions.remove(&session_id).await {
        StatusCode::OK.into_response()
    } else {
        let gate = GateError::SessionNotFound(session_id);
        (
            gate.http_status(),
            Json(rpc_error(Value::Null, gate.code(), &gate.message())),
        )
            .into_response()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Terminal pre-dispatch failure: one error envelope for the whole request.
/// Single requests echo their id; batches answer with a null id.
fn gate_response(elements: &[BatchElement], is_batch: bool, gate: GateError) -> Response {
    let id = if is_batch {
        Value::Null
    } else {
        elements
            .first()
            .and_then(|e| match e {
                BatchElement::Request(r) => r.id.clone(),
                BatchElement::Malformed => None,
            })
            .unwrap_or(Value::Null)
    };
    (
        gate.http_status(),
        Json(rpc_error(id, gate.code(), &gate.message())),
    )
        .into_response()
}

fn attach_session_header(response: &mut Response, session_id: &str) {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Fire-and-forget usage accounting - must never block or fail the request.
fn record_http(state: &AppState, method: &str, headers: &HeaderMap) {
    let ip = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = header_str(headers, "user-agent").unwrap_or_default();
    state.usage.record(UsageEvent::Http {
        method: method.to_string(),
        path: "/mcp".to_string(),
        ip,
        user_agent,
    });
}
