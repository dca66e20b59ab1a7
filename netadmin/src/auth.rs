//! Login sessions and the bearer-token middleware
//!
//! A successful login yields an opaque random token that stays valid for the
//! configured number of hours. Tokens live only in memory, so a restart logs
//! every client out.

use std::sync::Arc;

use anyhow::{bail, Result};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Issued tokens and their expiry
pub struct SessionRegistry {
    username: String,
    password: String,
    ttl: Duration,
    sessions: DashMap<String, DateTime<Utc>>,
}

impl SessionRegistry {
    /// Fails if the TTL is negative or too large to add to the current time.
    pub fn new(auth: &AuthConfig) -> Result<Self> {
        let hours = auth.session_ttl_hours;
        let ttl = match Duration::try_hours(hours) {
            Some(ttl) if hours >= 0 => ttl,
            _ => bail!("session_ttl_hours out of range: {hours}"),
        };
        if Utc::now().checked_add_signed(ttl).is_none() {
            bail!("session_ttl_hours out of range: {hours}");
        }

        Ok(Self {
            username: auth.username.clone(),
            password: auth.password.clone(),
            ttl,
            sessions: DashMap::new(),
        })
    }

    /// Check credentials and issue a token. Expired sessions are purged first.
    pub fn login(&self, req: &LoginRequest) -> Option<String> {
        if req.username != self.username || req.password != self.password {
            warn!("Rejected login for user {}", req.username);
            return None;
        }

        let now = Utc::now();
        self.sessions.retain(|_, expires_at| *expires_at > now);

        let token = Uuid::new_v4().simple().to_string();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.sessions.insert(token.clone(), expires_at);
        info!("Issued session for {}", req.username);
        Some(token)
    }

    /// True if the token was issued and has not expired. Expired tokens are dropped.
    pub fn validate(&self, token: &str) -> bool {
        let expires_at = match self.sessions.get(token) {
            Some(entry) => *entry.value(),
            None => return false,
        };
        if expires_at <= Utc::now() {
            self.sessions.remove(token);
            return false;
        }
        true
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

/// Middleware guarding the API routes
pub async fn require_session(
    State(sessions): State<Arc<SessionRegistry>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if header.is_empty() {
        return Err(ApiError::Unauthorized(
            "Authorization header required".into(),
        ));
    }

    let token = header.strip_prefix("Bearer ").unwrap_or(header);
    if !sessions.validate(token) {
        warn!("Rejected request to {} with invalid token", req.uri().path());
        return Err(ApiError::Unauthorized("Invalid token".into()));
    }

    Ok(next.run(req).await)
}
