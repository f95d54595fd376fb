//! Application state.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::sessions::SessionManager;
use crate::upstream::UpstreamClient;
use crate::usage::{UsageRecorder, UsageStats};

/// Central application state. Clone-friendly - everything shared is Arc'd.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub upstream: Arc<UpstreamClient>,
    pub usage: UsageRecorder,
    pub usage_stats: Arc<RwLock<UsageStats>>,
    pub start_time: Instant,
}

impl AppState {
    pub async fn new(config: Config) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        let upstream = UpstreamClient::new(client, config.upstream_base_url.clone());
        let (usage, usage_stats) = crate::usage::spawn(config.usage_file.clone()).await;

        let sessions = Arc::new(SessionManager::new());
        if let Some(ttl) = config.session_ttl {
            crate::sessions::spawn_ttl_sweep(sessions.clone(), ttl);
        }

        tracing::info!(
            upstream = %config.upstream_base_url,
            tools = crate::tools::registry().len(),
            "AppState initialised"
        );

        Self {
            config: Arc::new(config),
            sessions,
            upstream: Arc::new(upstream),
            usage,
            usage_stats,
            start_time: Instant::now(),
        }
    }

    /// Swap in a custom upstream client. Integration tests point this at an
    /// in-process mock with a millisecond backoff base.
    pub fn with_upstream(mut self, upstream: UpstreamClient) -> Self {
        self.upstream = Arc::new(upstream);
        self
    }
}
