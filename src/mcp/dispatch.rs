//! Protocol dispatcher - the per-request state machine.
//!
//! Pipeline: ProtocolVersionCheck → SessionResolution → MethodDispatch →
//! {Success | Error}. The dispatcher itself is stateless; all connection
//! state lives in the [`SessionManager`]. Every code path terminates in a
//! JSON-RPC result, a JSON-RPC error, or an explicit no-body outcome for
//! notifications - nothing escapes unhandled.

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::sessions::SessionManager;
use crate::state::AppState;
use crate::tools;
use crate::tools::format::format_response;

use super::protocol::{
    rpc_error, rpc_result, tool_content, RpcRequest, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PROTOCOL_VERSION, PROTOCOL_VERSION_FAMILY, SERVER_NAME, SERVER_VERSION,
    SESSION_NOT_FOUND, SESSION_REQUIRED,
};

/// Request-scoped context shared by every element of a batch. The resolved
/// credential lives here, never in shared mutable state.
pub struct RequestContext {
    pub session_id: String,
    pub api_key: Option<String>,
    /// True when this request minted the session (an `initialize` with no
    /// session header).
    pub minted: bool,
}

/// Terminal failures raised before method dispatch. These abort the whole
/// envelope (single request or batch).
#[derive(Debug)]
pub enum GateError {
    UnsupportedVersion(String),
    SessionRequired,
    SessionNotFound(String),
}

impl GateError {
    pub fn code(&self) -> i32 {
        match self {
            GateError::UnsupportedVersion(_) => INVALID_REQUEST,
            GateError::SessionRequired => SESSION_REQUIRED,
            GateError::SessionNotFound(_) => SESSION_NOT_FOUND,
        }
    }

    /// HTTP status mirroring the error category. The JSON-RPC body remains
    /// the authoritative signal.
    pub fn http_status(&self) -> StatusCode {
        match self {
            GateError::UnsupportedVersion(_) | GateError::SessionRequired => {
                StatusCode::BAD_REQUEST
            }
            GateError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn message(&self) -> String {
        match self {
            GateError::UnsupportedVersion(got) => format!(
                "Unsupported protocol version '{}' (this server speaks {})",
                got, PROTOCOL_VERSION
            ),
            GateError::SessionRequired => {
                "Missing Mcp-Session-Id header: call initialize first".to_string()
            }
            GateError::SessionNotFound(id) => format!("Session '{}' not found", id),
        }
    }
}

// ── Step 1: protocol version ────────────────────────────────────────────────

/// A supplied version must belong to the accepted calendar family. Absence
/// is treated as compatible for backward tolerance.
pub fn check_protocol_version(header: Option<&str>) -> Result<(), GateError> {
    match header {
        None => Ok(()),
        Some(v) if v.starts_with(PROTOCOL_VERSION_FAMILY) => Ok(()),
        Some(v) => Err(GateError::UnsupportedVersion(v.to_string())),
    }
}

// ── Step 2: session resolution ──────────────────────────────────────────────

/// Resolve the envelope-level session. Four admissible cases:
/// known id → proceed; no id + initialize → mint; unknown id → not-found;
/// no id + anything else → session-required.
pub async fn resolve_session(
    sessions: &SessionManager,
    header: Option<&str>,
    wants_initialize: bool,
) -> Result<(String, bool), GateError> {
    match header {
        Some(id) => match sessions.get(id).await {
            Some(session) => Ok((session.id, false)),
            None => Err(GateError::SessionNotFound(id.to_string())),
        },
        None if wants_initialize => Ok((sessions.create().await, true)),
        None => Err(GateError::SessionRequired),
    }
}

// ── Step 3: method dispatch ─────────────────────────────────────────────────

/// Route one request. Returns `None` for notifications (no body, ever -
/// success or failure).
pub async fn dispatch(state: &AppState, ctx: &RequestContext, req: &RpcRequest) -> Option<Value> {
    let method = req.method();

    if req.is_notification() {
        tracing::debug!(method, session_id = %ctx.session_id, "notification received");
        return None;
    }

    let id = req.id.clone().unwrap_or(Value::Null);
    tracing::debug!(method, session_id = %ctx.session_id, "dispatching request");

    let reply = match method {
        "initialize" => handle_initialize(&id),
        "ping" => rpc_result(&id, json!({})),
        "tools/list" => handle_tools_list(&id),
        // `invoke` is a legacy alias kept for older clients.
        "tools/call" | "invoke" => handle_tools_call(state, ctx, req, &id).await,
        m if m.starts_with("notifications/") => {
            // A notification method sent with an id still gets its envelope.
            rpc_result(&id, json!({}))
        }
        other => rpc_error(id, METHOD_NOT_FOUND, &format!("Method not found: {}", other)),
    };

    Some(reply)
}

/// One element of a batch: a parsed request, or something that was not a
/// JSON object at all (a bare number or string in the array).
pub enum BatchElement {
    Request(RpcRequest),
    Malformed,
}

/// Run an ordered batch against one shared context. Notifications contribute
/// nothing to the output; malformed elements contribute an invalid-request
/// error; order is otherwise preserved.
pub async fn dispatch_batch(
    state: &AppState,
    ctx: &RequestContext,
    elements: &[BatchElement],
) -> Vec<Value> {
    let mut out = Vec::with_capacity(elements.len());
    for element in elements {
        match element {
            BatchElement::Request(req) => {
                if let Some(reply) = dispatch(state, ctx, req).await {
                    out.push(reply);
                }
            }
            BatchElement::Malformed => {
                out.push(rpc_error(Value::Null, INVALID_REQUEST, "Invalid request"));
            }
        }
    }
    out
}

// ── Method handlers ─────────────────────────────────────────────────────────

fn handle_initialize(id: &Value) -> Value {
    rpc_result(
        id,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            },
            "instructions": "SEO data gateway: keyword volume, related terms, \
                             domain/URL rankings, traffic estimates and backlinks. \
                             Use tools/list to discover the available lookups."
        }),
    )
}

fn handle_tools_list(id: &Value) -> Value {
    let tools: Vec<Value> = tools::registry()
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "inputSchema": t.schema,
            })
        })
        .collect();
    rpc_result(id, json!({ "tools": tools }))
}

async fn handle_tools_call(
    state: &AppState,
    ctx: &RequestContext,
    req: &RpcRequest,
    id: &Value,
) -> Value {
    let params = req.params.clone().unwrap_or_else(|| json!({}));
    let Some(tool_name) = params.get("name").and_then(|n| n.as_str()) else {
        return rpc_error(id.clone(), INVALID_PARAMS, "Missing 'name' in params");
    };
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    let Some(tool) = tools::registry().get(tool_name) else {
        return rpc_error(
            id.clone(),
            METHOD_NOT_FOUND,
            &format!("Tool not found: {}", tool_name),
        );
    };

    tracing::info!(tool = %tool_name, session_id = %ctx.session_id, "tools/call");
    state.usage.record_tool(tool_name);

    // Argument problems and upstream failures are both tool-execution
    // errors: successful envelope, isError content.
    let payload = match (tool.build)(&arguments) {
        Ok(payload) => payload,
        Err(msg) => return tool_content(id, format!("Error: {}", msg), true),
    };

    match state
        .upstream
        .call(tool.endpoint, &payload, ctx.api_key.as_deref())
        .await
    {
        Ok(raw) => tool_content(id, format_response(tool_name, &raw), false),
        Err(e) => tool_content(id, format!("Error: {}", e), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_family_check() {
        assert!(check_protocol_version(None).is_ok());
        assert!(check_protocol_version(Some("2025-06-18")).is_ok());
        assert!(check_protocol_version(Some("2025-03-26")).is_ok());
        let err = check_protocol_version(Some("2024-11-05")).unwrap_err();
        assert_eq!(err.code(), INVALID_REQUEST);
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_resolution_cases() {
        let sessions = SessionManager::new();

        // no id + initialize → mint
        let (id, minted) = resolve_session(&sessions, None, true).await.unwrap();
        assert!(minted);

        // known id → resolve without minting
        let (same, minted) = resolve_session(&sessions, Some(&id), false).await.unwrap();
        assert_eq!(same, id);
        assert!(!minted);

        // unknown id → not-found, even for initialize
        let err = resolve_session(&sessions, Some("bogus"), true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), SESSION_NOT_FOUND);
        assert_eq!(err.http_status(), StatusCode::NOT_FOUND);

        // no id + non-initialize → session-required
        let err = resolve_session(&sessions, None, false).await.unwrap_err();
        assert_eq!(err.code(), SESSION_REQUIRED);
    }
}
