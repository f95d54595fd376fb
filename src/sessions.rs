//! MCP session registry.
//!
//! A session exists iff it was minted by a successful `initialize` and has
//! not been explicitly terminated (or TTL-evicted when configured). Session
//! ids are uuid-v4 - 122 random bits, unguessable, unique among live
//! sessions for any realistic load.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Owns the set of live sessions. The dispatcher only reads/validates by id;
/// creation and teardown go through here.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new session and return its id.
    pub async fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let session = Session {
            id: id.clone(),
            created_at: Utc::now(),
        };
        self.sessions.write().await.insert(id.clone(), session);
        tracing::debug!(session_id = %id, "session created");
        id
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session. Returns `true` when it was present - the transport
    /// needs the distinction for 200-vs-404 reporting.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::debug!(session_id = %id, "session terminated");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions older than `ttl`. Called by the sweep task when
    /// `SESSION_TTL_SECS` is configured.
    pub async fn evict_older_than(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));
        let mut map = self.sessions.write().await;
        let before = map.len();
        map.retain(|_, s| s.created_at > cutoff);
        let evicted = before - map.len();
        if evicted > 0 {
            tracing::info!(evicted, "session TTL sweep");
        }
        evicted
    }
}

/// Spawn the periodic TTL sweep. Callers skip this when no TTL is configured.
pub fn spawn_ttl_sweep(sessions: Arc<SessionManager>, ttl: Duration) {
    tokio::spawn(async move {
        let period = ttl.min(Duration::from_secs(60));
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            sessions.evict_older_than(ttl).await;
        }
    });
}
