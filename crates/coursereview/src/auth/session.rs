//! Server-side sessions kept in the cache store.
//!
//! The client only ever holds the random session id; the store key is its
//! SHA-256 so a leaked store dump cannot be replayed as cookies.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::tokens::{generate_anon_id, generate_session_id, TokenHash};
use crate::store::TtlStore;

pub const SESSION_COOKIE: &str = "sessionid";

/// What a session id resolves to. Anonymous sessions have no user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    /// Stable id of the browser before login, merged into the student profile
    pub anon_id: String,
}

impl SessionData {
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

pub struct SessionStore {
    store: Arc<TtlStore>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<TtlStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn load(&self, session_id: &str) -> Option<SessionData> {
        let raw = self.store.get(&TokenHash::of(session_id).session_key())?;
        serde_json::from_str(&raw).ok()
    }

    /// Creates an anonymous session and returns its id.
    pub fn create_anonymous(&self) -> Result<(String, SessionData), serde_json::Error> {
        let data = SessionData {
            user_id: None,
            username: None,
            anon_id: generate_anon_id(),
        };
        let id = generate_session_id();
        self.save(&id, &data)?;
        Ok((id, data))
    }

    /// Starts an authenticated session. The previous session id, if any, is
    /// retired and its anonymous id carried over.
    pub fn login(
        &self,
        previous: Option<&str>,
        user_id: i64,
        username: &str,
    ) -> Result<(String, SessionData), serde_json::Error> {
        let anon_id = previous
            .and_then(|id| {
                let data = self.load(id);
                self.destroy(id);
                data
            })
            .map(|data| data.anon_id)
            .unwrap_or_else(generate_anon_id);

        let data = SessionData {
            user_id: Some(user_id),
            username: Some(username.to_string()),
            anon_id,
        };
        let id = generate_session_id();
        self.save(&id, &data)?;
        Ok((id, data))
    }

    pub fn destroy(&self, session_id: &str) -> bool {
        self.store.delete(&TokenHash::of(session_id).session_key())
    }

    fn save(&self, session_id: &str, data: &SessionData) -> Result<(), serde_json::Error> {
        self.store.set_ex(
            TokenHash::of(session_id).session_key(),
            serde_json::to_string(data)?,
            self.ttl,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions() -> SessionStore {
        SessionStore::new(Arc::new(TtlStore::new()), Duration::from_secs(60))
    }

    #[test]
    fn test_anonymous_then_login_keeps_anon_id() {
        let sessions = sessions();
        let (anon_sid, anon) = sessions.create_anonymous().unwrap();
        assert!(!anon.is_authenticated());
        assert_eq!(anon.anon_id.len(), 32);

        let (sid, data) = sessions.login(Some(&anon_sid), 7, "alice").unwrap();
        assert_ne!(sid, anon_sid);
        assert_eq!(data.anon_id, anon.anon_id);
        assert_eq!(sessions.load(&sid), Some(data));
        assert!(sessions.load(&anon_sid).is_none());
    }

    #[test]
    fn test_destroy() {
        let sessions = sessions();
        let (sid, _) = sessions.login(None, 1, "bob").unwrap();
        assert!(sessions.destroy(&sid));
        assert!(sessions.load(&sid).is_none());
        assert!(!sessions.destroy(&sid));
    }
}
