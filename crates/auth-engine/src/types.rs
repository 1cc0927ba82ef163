//! Session and user records as issued by the identity backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity record associated 1:1 with a current session.
///
/// Always sourced from backend auth responses, never constructed locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable user ID
    pub id: String,
    /// Email address, if the provider supplied one
    #[serde(default)]
    pub email: Option<String>,
    /// Identity provider (e.g. "email", "google")
    #[serde(default)]
    pub provider: Option<String>,
    /// Provider-supplied profile metadata
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Bearer credential set issued by the identity backend.
///
/// Exactly one session is current at a time, or none; it is owned by the
/// session lifecycle manager and never mutated outside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Access token (opaque bearer credential)
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
    /// The identity this session proves
    pub user: User,
}

impl Session {
    /// Whether the access token has passed its expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Whether this session carries the same token pair as another.
    pub fn same_tokens(&self, access_token: &str, refresh_token: &str) -> bool {
        self.access_token == access_token && self.refresh_token == refresh_token
    }
}

/// What kind of auth-state change the backend is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthChangeKind {
    /// Session restored from persisted state at startup
    InitialSession,
    /// A sign-in (password, sign-up confirmation, or OAuth) completed
    SignedIn,
    /// The session was revoked or the user signed out
    SignedOut,
    /// The token pair was rotated by a refresh
    TokenRefreshed,
    /// A refresh attempt failed; if no session is attached the session is gone
    RefreshFailed,
}

/// Auth-state change notification delivered to subscribed listeners.
#[derive(Debug, Clone)]
pub struct AuthChangeEvent {
    /// What happened
    pub kind: AuthChangeKind,
    /// The session after the change, if one exists
    pub session: Option<Session>,
}
