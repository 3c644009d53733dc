use std::{collections::HashMap, fmt, time::Duration};

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use tokio::sync::RwLock;

use crate::model::UserId;

const TOKEN_LEN: usize = 32;

/// Opaque token handed to a client in place of its user id
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// keep tokens out of logs
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug)]
struct Session {
    user_id: UserId,
    expires_at: DateTime<Utc>,
}

/// Issues and resolves session tokens. A token is only ever produced here,
/// so a client cannot pick the user it acts as.
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn issue(&self, user_id: UserId) -> SessionToken {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.sessions.write().await.insert(
            token.clone(),
            Session {
                user_id,
                expires_at,
            },
        );
        SessionToken(token)
    }

    /// Map a token back to its user. Unknown and expired tokens resolve to `None`.
    pub async fn resolve(&self, token: &str) -> Option<UserId> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(s) if s.expires_at > now => return Some(s.user_id),
                Some(_) => {}
                None => return None,
            }
        }
        self.sessions.write().await.remove(token);
        None
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Drop every expired session and return how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }
}

#[cfg(test)]
mod ttl_tests {
    use super::*;

    #[tokio::test]
    async fn expired_session_resolves_to_none_and_is_dropped() {
        let store = SessionStore::new(Duration::ZERO);
        let token = store.issue(42).await;
        assert_eq!(store.resolve(token.as_str()).await, None);
        assert!(store.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn purge_keeps_live_sessions() {
        let store = SessionStore::new(Duration::from_secs(60));
        let live = store.issue(1).await;
        store.sessions.write().await.insert(
            "stale".to_string(),
            Session {
                user_id: 2,
                expires_at: Utc::now() - chrono::Duration::seconds(1),
            },
        );
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.resolve(live.as_str()).await, Some(1));
    }
}
