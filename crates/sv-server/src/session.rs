//! In-memory bearer-token sessions

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use rand::RngCore;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy)]
struct Session {
    user_id: i64,
    expires_at: OffsetDateTime,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session and return its token
    pub fn create(&self, user_id: i64, lifetime: Duration) -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        self.sessions.insert(
            token.clone(),
            Session {
                user_id,
                expires_at: OffsetDateTime::now_utc() + lifetime,
            },
        );
        token
    }

    /// User behind a live token. Expired sessions are dropped on lookup.
    pub fn resolve(&self, token: &str) -> Option<i64> {
        let now = OffsetDateTime::now_utc();
        let expired = match self.sessions.get(token) {
            Some(session) if session.expires_at > now => return Some(session.user_id),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.sessions.remove(token);
        }
        None
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn purge_expired(&self) {
        let now = OffsetDateTime::now_utc();
        self.sessions.retain(|_, session| session.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
