//! JSON-RPC 2.0 / MCP wire envelopes.
//!
//! Requests deserialize into [`RpcRequest`]; responses are built with the
//! `json!` helpers so the envelope shape lives in exactly one place.

use serde::Deserialize;
use serde_json::{json, Value};

pub const SERVER_NAME: &str = "seo-mcp-gateway";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2025-06-18";
/// Accepted calendar-version family. A client-supplied version outside this
/// family is rejected before any session work; an absent version is
/// tolerated for older clients.
pub const PROTOCOL_VERSION_FAMILY: &str = "2025-";

// ── JSON-RPC error codes ────────────────────────────────────────────────────

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
// Implementation-defined range (-32000..-32099): session lifecycle.
pub const SESSION_REQUIRED: i32 = -32000;
pub const SESSION_NOT_FOUND: i32 = -32001;

// ── Request envelope ────────────────────────────────────────────────────────

/// One JSON-RPC request. Every field is lenient so malformed envelopes reach
/// the dispatcher and get a proper error instead of a serde rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Absent (or null) id marks a notification - it must never produce a
    /// response body.
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn is_notification(&self) -> bool {
        matches!(self.id, None | Some(Value::Null))
    }

    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("")
    }
}

// ── Response builders ───────────────────────────────────────────────────────

pub fn rpc_result(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

pub fn rpc_error(id: Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

/// Tool output envelope. Tool failures are data, not protocol faults: they
/// ride in a *successful* envelope flagged `isError` so the calling
/// assistant can narrate them.
pub fn tool_content(id: &Value, text: String, is_error: bool) -> Value {
    rpc_result(
        id,
        json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error
        }),
    )
}
