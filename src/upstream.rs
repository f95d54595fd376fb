//! Upstream SEO API client.
//!
//! One HTTP call per tool invocation (absent retries). Only HTTP 429 is
//! retried - up to [`MAX_RETRIES`] additional attempts with exponential
//! backoff (1 s, 2 s, 4 s in production) plus random jitter. Every other
//! non-2xx outcome is translated immediately into an [`UpstreamError`].

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

/// Maximum number of retry attempts after a 429 from the upstream API.
pub const MAX_RETRIES: u32 = 3;

/// Production backoff base. Doubles each attempt: 1 s, 2 s, 4 s.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Request body shape for one upstream endpoint. Parameterless reads are
/// GETs; everything else POSTs either URL-encoded form pairs or a JSON body.
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    Form(Vec<(String, String)>),
    Json(Value),
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error(
        "No API key available. Set SEO_API_KEY on the server or pass one via \
         ?api_key= or the X-Api-Key header."
    )]
    MissingApiKey,

    #[error("Authentication failed: the upstream API rejected the API key")]
    Unauthorized,

    #[error("Rate limited by the upstream API (gave up after {MAX_RETRIES} retries)")]
    RateLimited,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream API error ({status}): {message}")]
    Api { status: String, message: String },
}

/// Thin client over the upstream SEO provider. Cheap to share behind an Arc;
/// the inner `reqwest::Client` is pooled.
pub struct UpstreamClient {
    http: Client,
    base_url: Url,
    backoff_base: Duration,
}

impl UpstreamClient {
    pub fn new(http: Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            backoff_base: BACKOFF_BASE,
        }
    }

    /// Override the backoff base. Tests inject milliseconds so the retry
    /// schedule runs in real time without multi-second sleeps.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Perform one upstream call for `path` with the given payload shape,
    /// retrying 429s per the bounded backoff schedule.
    pub async fn call(
        &self,
        path: &str,
        payload: &Payload,
        api_key: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        let api_key = api_key.ok_or(UpstreamError::MissingApiKey)?;
        let url = self.endpoint_url(path)?;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: base * 2^(attempt-1) + random jitter.
                let backoff = self.backoff_base * 2u32.saturating_pow(attempt - 1);
                let jitter_ceil = (self.backoff_base.as_millis() as u64 / 2).max(1);
                let jitter =
                    Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ceil));
                tracing::warn!(
                    path,
                    attempt = attempt + 1,
                    max = MAX_RETRIES + 1,
                    "upstream rate limited, backing off {:?}",
                    backoff + jitter
                );
                tokio::time::sleep(backoff + jitter).await;
            }

            let result = self.send(&url, payload, api_key).await;
            match result {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    // Retryable - loop unless the budget is spent.
                    continue;
                }
                Ok(resp) => return classify(path, resp).await,
                Err(e) => {
                    tracing::error!(path, "upstream request failed: {}", e);
                    return Err(UpstreamError::Api {
                        status: "unknown".to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::error!(path, "upstream still rate limited after {} retries", MAX_RETRIES);
        Err(UpstreamError::RateLimited)
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, UpstreamError> {
        // Base URL is validated at startup; a join can only fail on a
        // malformed catalogue path.
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| UpstreamError::Api {
                status: "unknown".to_string(),
                message: format!("invalid endpoint path '{}': {}", path, e),
            })
    }

    async fn send(
        &self,
        url: &Url,
        payload: &Payload,
        api_key: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let builder = match payload {
            Payload::None => self.http.get(url.clone()),
            Payload::Form(pairs) => self.http.post(url.clone()).form(pairs),
            Payload::Json(body) => self.http.post(url.clone()).json(body),
        };
        builder
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Accept", "application/json")
            .send()
            .await
    }
}

/// Translate a non-429 upstream response into a payload or a typed error.
async fn classify(path: &str, resp: reqwest::Response) -> Result<Value, UpstreamError> {
    let status = resp.status();

    if status.is_success() {
        tracing::debug!(path, status = status.as_u16(), "upstream call ok");
        return resp.json::<Value>().await.map_err(|e| UpstreamError::Api {
            status: status.as_u16().to_string(),
            message: format!("upstream returned invalid JSON: {}", e),
        });
    }

    let message = best_message(resp).await;
    tracing::warn!(path, status = status.as_u16(), "upstream error: {}", message);

    match status.as_u16() {
        400 => Err(UpstreamError::BadRequest(augment_quota_guidance(&message))),
        401 => Err(UpstreamError::Unauthorized),
        s => Err(UpstreamError::Api {
            status: s.to_string(),
            message,
        }),
    }
}

/// Best-available human message from an upstream error body: a `message` or
/// `error` JSON field when present, otherwise the truncated raw body.
async fn best_message(resp: reqwest::Response) -> String {
    let body = resp.text().await.unwrap_or_default();
    if body.is_empty() {
        return "unknown".to_string();
    }
    if let Ok(json) = serde_json::from_str::<Value>(&body) {
        for key in ["message", "error", "detail"] {
            if let Some(msg) = json.get(key).and_then(|m| m.as_str()) {
                return msg.to_string();
            }
        }
    }
    truncate_str(&body, 500)
}

/// Advisory text appended to 400 messages that look like quota problems.
/// Purely heuristic string matching - never parsed as structured data.
fn augment_quota_guidance(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("credit") || lower.contains("subscription") || lower.contains("limit") {
        format!(
            "{} (this usually means the account is out of credits - \
             check the remaining balance with get_credits or review the subscription plan)",
            message
        )
    } else {
        message.to_string()
    }
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let boundary = s
            .char_indices()
            .take_while(|(i, _)| *i < max_len)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(max_len);
        format!("{}...", &s[..boundary])
    }
}
