//! MCP protocol surface: wire envelopes, the dispatch state machine, and the
//! HTTP transport binding.

pub mod dispatch;
pub mod protocol;
pub mod transport;
