//! Usage analytics - fire-and-forget counters with file persistence.
//!
//! The request path hands events to an unbounded channel and moves on;
//! a background task aggregates counters and flushes them to a JSON file
//! every 30 s when something changed. Accounting failures are logged and
//! never propagate into request handling.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};

use crate::state::AppState;

const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// One usage event. `Http` is recorded per transport request, `Tool` per
/// resolved `tools/call`.
#[derive(Debug, Clone)]
pub enum UsageEvent {
    Http {
        method: String,
        path: String,
        ip: String,
        user_agent: String,
    },
    Tool {
        name: String,
    },
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub by_method: HashMap<String, u64>,
    pub by_tool: HashMap<String, u64>,
    /// Daily request buckets keyed `YYYY-MM-DD`.
    pub by_day: HashMap<String, u64>,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl UsageStats {
    fn apply(&mut self, event: &UsageEvent) {
        match event {
            UsageEvent::Http {
                method,
                path,
                ip,
                user_agent,
            } => {
                self.total_requests += 1;
                *self.by_method.entry(method.clone()).or_insert(0) += 1;
                let day = Utc::now().format("%Y-%m-%d").to_string();
                *self.by_day.entry(day).or_insert(0) += 1;
                self.last_request_at = Some(Utc::now());
                tracing::trace!(%method, %path, %ip, %user_agent, "usage event");
            }
            UsageEvent::Tool { name } => {
                *self.by_tool.entry(name.clone()).or_insert(0) += 1;
            }
        }
    }
}

/// Cheap handle the request path uses to record events. Send failures are
/// swallowed - accounting must never affect a request.
#[derive(Clone)]
pub struct UsageRecorder {
    tx: mpsc::UnboundedSender<UsageEvent>,
}

impl UsageRecorder {
    pub fn record(&self, event: UsageEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("usage channel closed, event dropped");
        }
    }

    pub fn record_tool(&self, name: &str) {
        self.record(UsageEvent::Tool {
            name: name.to_string(),
        });
    }
}

/// Spawn the aggregator task. Loads existing stats from `path` when present
/// so counters survive restarts.
pub async fn spawn(path: PathBuf) -> (UsageRecorder, Arc<RwLock<UsageStats>>) {
    let initial = load(&path).await;
    let stats = Arc::new(RwLock::new(initial));
    let (tx, mut rx) = mpsc::unbounded_channel::<UsageEvent>();

    let task_stats = stats.clone();
    tokio::spawn(async move {
        let mut flush = tokio::time::interval(FLUSH_INTERVAL);
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut dirty = false;
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            task_stats.write().await.apply(&event);
                            dirty = true;
                        }
                        // All senders dropped - final flush and stop.
                        None => {
                            if dirty {
                                persist(&path, &*task_stats.read().await).await;
                            }
                            break;
                        }
                    }
                }
                _ = flush.tick() => {
                    if dirty {
                        persist(&path, &*task_stats.read().await).await;
                        dirty = false;
                    }
                }
            }
        }
    });

    (UsageRecorder { tx }, stats)
}

async fn load(path: &PathBuf) -> UsageStats {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(stats) => {
                tracing::info!(path = %path.display(), "usage stats loaded");
                stats
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "usage stats unreadable, starting fresh: {}", e);
                UsageStats::default()
            }
        },
        Err(_) => UsageStats::default(),
    }
}

async fn persist(path: &PathBuf, stats: &UsageStats) {
    let body = match serde_json::to_string_pretty(stats) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("usage stats serialization failed: {}", e);
            return;
        }
    };
    if let Err(e) = tokio::fs::write(path, body).await {
        tracing::warn!(path = %path.display(), "usage stats flush failed: {}", e);
    }
}

// ── Reporting endpoints (read-only) ─────────────────────────────────────────

/// GET /health - liveness + basic figures.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "app": "seo-mcp-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "live_sessions": state.sessions.len().await,
    }))
}

/// GET /analytics/summary - aggregate request counters.
pub async fn usage_summary(State(state): State<AppState>) -> Json<Value> {
    let stats = state.usage_stats.read().await;
    Json(json!({
        "total_requests": stats.total_requests,
        "by_method": stats.by_method,
        "by_day": stats.by_day,
        "last_request_at": stats.last_request_at,
    }))
}

/// GET /analytics/tools - per-tool call counters.
pub async fn usage_tools(State(state): State<AppState>) -> Json<Value> {
    let stats = state.usage_stats.read().await;
    let mut tools: Vec<(&String, &u64)> = stats.by_tool.iter().collect();
    tools.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let tools: Vec<Value> = tools
        .into_iter()
        .map(|(name, count)| json!({ "tool": name, "calls": count }))
        .collect();
    Json(json!({ "tools": tools }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_event(method: &str) -> UsageEvent {
        UsageEvent::Http {
            method: method.to_string(),
            path: "/mcp".to_string(),
            ip: "unknown".to_string(),
            user_agent: "test".to_string(),
        }
    }

    #[test]
    fn counters_accumulate() {
        let mut stats = UsageStats::default();
        stats.apply(&http_event("POST"));
        stats.apply(&http_event("POST"));
        stats.apply(&http_event("DELETE"));
        stats.apply(&UsageEvent::Tool {
            name: "get_credits".to_string(),
        });

        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.by_method["POST"], 2);
        assert_eq!(stats.by_method["DELETE"], 1);
        assert_eq!(stats.by_tool["get_credits"], 1);
        assert!(stats.last_request_at.is_some());
        // tool events do not inflate the request total
        assert_eq!(stats.by_day.values().sum::<u64>(), 3);
    }

    #[tokio::test]
    async fn persist_and_reload_round_trip() {
        let path = std::env::temp_dir().join(format!("usage-{}.json", uuid::Uuid::new_v4()));
        let mut stats = UsageStats::default();
        stats.apply(&http_event("POST"));
        persist(&path, &stats).await;

        let reloaded = load(&path).await;
        assert_eq!(reloaded.total_requests, 1);
        assert_eq!(reloaded.by_method["POST"], 1);
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn recorder_feeds_shared_stats() {
        let path = std::env::temp_dir().join(format!("usage-{}.json", uuid::Uuid::new_v4()));
        let (recorder, stats) = spawn(path.clone()).await;
        recorder.record(http_event("GET"));
        recorder.record_tool("get_countries");

        // Unbounded channel: give the aggregator a tick to drain.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = stats.read().await.clone();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.by_tool["get_countries"], 1);
        tokio::fs::remove_file(&path).await.ok();
    }
}
