//! Login sessions.
//!
//! Tokens are random UUIDs kept in process memory with a fixed lifetime.
//! A restart logs everyone out.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "farmwise_session";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(skip)]
    pub token: String,
    pub farmer_id: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

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

    /// Issues a new token and purges expired ones.
    pub async fn create(&self, farmer_id: &str, email: &str) -> Session {
        let now = Utc::now();
        let session = Session {
            token: uuid::Uuid::new_v4().to_string(),
            farmer_id: farmer_id.to_string(),
            email: email.to_string(),
            expires_at: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        if sessions.len() != before {
            debug!(purged = before - sessions.len(), "Purged expired sessions");
        }
        sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// Returns the live session for `token`, dropping it if it has expired.
    pub async fn get(&self, token: &str) -> Option<Session> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                None => return None,
                Some(s) if !s.is_expired(now) => return Some(s.clone()),
                Some(_) => {}
            }
        }
        self.sessions.write().await.remove(token);
        None
    }

    /// Returns whether a session was removed.
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Reads the session token from `Authorization: Bearer` or the session cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub fn session_cookie(token: &str, ttl: Duration) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl.num_seconds()
    )
}

pub fn cleared_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}

/// Extractor for handlers that require a logged-in farmer.
#[derive(Debug, Clone)]
pub struct AuthSession(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Not signed in".to_string()))?;
        state
            .sessions
            .get(&token)
            .await
            .map(AuthSession)
            .ok_or_else(|| ApiError::Unauthorized("Session expired or invalid".to_string()))
    }
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
