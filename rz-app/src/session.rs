//! Browser sessions keyed by an opaque cookie.
//!
//! Each session holds the pending OAuth `state` and the Rememberizer tokens.
//! Sessions live in memory only and are lost on restart.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rz_tools::BearerToken;
use std::time::Duration;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "rz_session";

#[derive(Debug, Clone)]
pub struct WebSession {
    pub oauth_state: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl WebSession {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            oauth_state: None,
            access_token: None,
            refresh_token: None,
            created_at: now,
            last_active: now,
        }
    }

    pub fn bearer(&self) -> Option<BearerToken> {
        self.access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(BearerToken::new)
    }
}

pub struct SessionStore {
    sessions: DashMap<String, WebSession>,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_ttl,
        }
    }

    fn is_idle(&self, session: &WebSession, now: DateTime<Utc>) -> bool {
        (now - session.last_active)
            .to_std()
            .is_ok_and(|idle| idle > self.idle_ttl)
    }

    /// Returns the id from the request cookie when it names a live session.
    /// An idle-expired session is dropped and reported as absent.
    pub fn lookup(&self, headers: &HeaderMap) -> Option<String> {
        let id = session_id_from_headers(headers)?;
        let now = Utc::now();
        {
            let mut entry = self.sessions.get_mut(&id)?;
            if !self.is_idle(&entry, now) {
                entry.last_active = now;
                return Some(id);
            }
        }
        self.sessions.remove(&id);
        tracing::debug!("idle session expired");
        None
    }

    /// Returns the live session id, creating a session when the cookie is
    /// absent or stale. The flag is true when a new cookie must be sent.
    pub fn lookup_or_create(&self, headers: &HeaderMap) -> (String, bool) {
        if let Some(id) = self.lookup(headers) {
            return (id, false);
        }
        self.prune_idle(Utc::now());
        let id = Uuid::new_v4().simple().to_string();
        self.sessions.insert(id.clone(), WebSession::new());
        tracing::debug!(session_count = self.sessions.len(), "session created");
        (id, true)
    }

    /// Drops every session idle longer than the TTL as of `now`.
    pub fn prune_idle(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !self.is_idle(s, now));
        let pruned = before.saturating_sub(self.sessions.len());
        if pruned > 0 {
            tracing::debug!(pruned, "idle sessions pruned");
        }
        pruned
    }

    pub fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut WebSession),
    {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                f(&mut entry);
                entry.last_active = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Access token of the session named by the request cookie.
    pub fn bearer_for(&self, headers: &HeaderMap) -> Option<BearerToken> {
        let id = self.lookup(headers)?;
        self.sessions.get(&id)?.bearer()
    }

    pub fn remove(&self, id: &str) -> Option<WebSession> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn session_cookie(id: &str) -> HeaderValue {
    let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
    HeaderValue::from_str(&cookie)
        .unwrap_or_else(|_| HeaderValue::from_static("rz_session=; Path=/"))
}

pub fn expired_session_cookie() -> HeaderValue {
    HeaderValue::from_static("rz_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

pub fn set_cookie(headers: &mut HeaderMap, value: HeaderValue) {
    headers.append(SET_COOKIE, value);
}
