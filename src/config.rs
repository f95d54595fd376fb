//! Environment-driven configuration.
//!
//! All knobs come from the environment (`.env` is loaded by `main`):
//! - `PORT` - listen port (default 8082)
//! - `SEO_API_KEY` - default upstream credential; callers may override
//!   per-request via `?api_key=` or the `X-Api-Key` header
//! - `SEO_API_BASE_URL` - upstream base URL (default Keywords Everywhere v1)
//! - `USAGE_FILE` - analytics persistence path (default `usage_stats.json`)
//! - `SESSION_TTL_SECS` - optional idle-session eviction; off when unset

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.keywordseverywhere.com/v1/";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Process-wide default upstream credential. `None` is allowed at startup;
    /// tool calls without any credential fail with a configuration error.
    pub default_api_key: Option<String>,
    pub upstream_base_url: Url,
    pub usage_file: PathBuf,
    /// When set, sessions idle past this duration are evicted by a sweep task.
    pub session_ttl: Option<Duration>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8082".to_string())
            .parse()?;

        let default_api_key = std::env::var("SEO_API_KEY").ok().filter(|s| !s.is_empty());
        if default_api_key.is_some() {
            tracing::info!("SEO_API_KEY configured - default upstream credential available");
        } else {
            tracing::warn!(
                "SEO_API_KEY not set - tool calls require a per-request api_key override"
            );
        }

        // A trailing slash matters: `Url::join` replaces the last path
        // segment of a slash-less base.
        let mut raw_base = std::env::var("SEO_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_BASE_URL.to_string());
        if !raw_base.ends_with('/') {
            raw_base.push('/');
        }
        let upstream_base_url = raw_base.parse::<Url>()?;

        let usage_file = std::env::var("USAGE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("usage_stats.json"));

        let session_ttl = std::env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&s| s > 0)
            .map(Duration::from_secs);
        if let Some(ttl) = session_ttl {
            tracing::info!("session TTL enabled: {}s", ttl.as_secs());
        }

        Ok(Self {
            port,
            default_api_key,
            upstream_base_url,
            usage_file,
            session_ttl,
        })
    }
}
