//! In-memory chat session store

use super::store::ChatHistory;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// One conversation. Holding the history lock serializes its turns.
#[derive(Debug)]
pub struct ChatSession {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub history: Mutex<ChatHistory>,
}

pub const DEFAULT_MAX_SESSIONS: usize = 1000;

pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<ChatSession>>>,
    max_sessions: usize,
    max_messages: usize,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(max_messages: usize, ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_messages,
            ttl,
        }
    }

    /// Cap on live sessions. At the cap, creating a session evicts the least
    /// recently used one.
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Look up a session, creating it on first use. An expired session is
    /// replaced by a fresh one.
    pub async fn get_or_create(&self, id: Uuid) -> Arc<ChatSession> {
        if let Some(session) = self.sessions.read().await.get(&id) {
            if !is_expired(session, self.ttl) {
                return Arc::clone(session);
            }
        }

        let mut sessions = self.sessions.write().await;
        evict_expired(&mut sessions, self.ttl);

        if let Some(session) = sessions.get(&id) {
            return Arc::clone(session);
        }

        while sessions.len() >= self.max_sessions {
            let Some(oldest) = least_recently_used(&sessions) else {
                break;
            };
            sessions.remove(&oldest);
            debug!(session_id = %oldest, "Evicted chat session to stay under the cap");
        }

        debug!(session_id = %id, live = sessions.len() + 1, "Creating chat session");
        let session = Arc::new(ChatSession {
            id,
            created_at: Utc::now(),
            history: Mutex::new(ChatHistory::new(self.max_messages)),
        });
        sessions.insert(id, Arc::clone(&session));
        session
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<ChatSession>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Idle past the TTL. A session with a turn in progress is locked and never
/// counts as expired.
fn is_expired(session: &ChatSession, ttl: Duration) -> bool {
    match session.history.try_lock() {
        Ok(history) => history.idle_for() > ttl,
        Err(_) => false,
    }
}

fn evict_expired(sessions: &mut HashMap<Uuid, Arc<ChatSession>>, ttl: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, session| !is_expired(session, ttl));

    let evicted = before - sessions.len();
    if evicted > 0 {
        info!(evicted, remaining = sessions.len(), "Evicted idle chat sessions");
    }
    evicted
}

/// The longest idle session not in a turn, else the oldest session.
fn least_recently_used(sessions: &HashMap<Uuid, Arc<ChatSession>>) -> Option<Uuid> {
    sessions
        .iter()
        .filter_map(|(id, session)| {
            session
                .history
                .try_lock()
                .ok()
                .map(|history| (*id, history.idle_for()))
        })
        .max_by_key(|(_, idle)| *idle)
        .map(|(id, _)| id)
        .or_else(|| {
            sessions
                .values()
                .min_by_key(|session| session.created_at)
                .map(|session| session.id)
        })
}

/// Map a caller supplied session id to a UUID.
///
/// Missing ids start a new session. Values that are not UUIDs map to a
/// stable UUID derived from their SHA-256 hash, so the same string always
/// reaches the same session.
pub fn session_uuid(value: Option<&str>) -> Uuid {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v)),
        _ => Uuid::new_v4(),
    }
}

fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}
