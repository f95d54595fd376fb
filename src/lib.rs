pub mod config;
pub mod mcp;
pub mod sessions;
pub mod state;
pub mod tools;
pub mod upstream;
pub mod usage;

use axum::routing::get;
use axum::Router;

use mcp::transport;
use state::AppState;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // The MCP endpoint: one path, four verbs
        .route(
            "/mcp",
            get(transport::liveness)
                .post(transport::rpc)
                .delete(transport::terminate)
                .options(transport::preflight),
        )
        // Health
        .route("/health", get(usage::health))
        // Usage reporting (read-only)
        .route("/analytics/summary", get(usage::usage_summary))
        .route("/analytics/tools", get(usage::usage_tools))
        // Shared state
        .with_state(state)
}
