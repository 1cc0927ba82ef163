//! Trait seams between the session lifecycle and the remote backend.
//!
//! The engine only ever talks to these traits; the HTTP implementations live
//! in the gateway crate, and the tests supply in-memory doubles.

use async_trait::async_trait;

use crate::error::AuthResult;
use crate::types::{AuthChangeEvent, Session};

/// Callback invoked on every auth-state change reported by the backend.
pub type AuthChangeListener = Box<dyn Fn(AuthChangeEvent) + Send + Sync>;

/// The identity backend: credential exchange, session persistence and the
/// auth-change event stream.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Sign in with email and password.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session>;

    /// Create an account. Returns `None` when the backend requires email
    /// confirmation before issuing a session.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<serde_json::Value>,
        redirect_url: &str,
    ) -> AuthResult<Option<Session>>;

    /// Begin an OAuth flow. Returns the provider authorization URL the
    /// embedding shell must open in a browser.
    async fn sign_in_with_oauth(&self, provider: &str, redirect_url: &str) -> AuthResult<String>;

    /// Redeem a PKCE authorization code for a session.
    async fn exchange_code_for_session(&self, code: &str) -> AuthResult<Session>;

    /// Adopt a token pair delivered out of band (e.g. an implicit-flow
    /// redirect) as the current session.
    async fn set_session(&self, access_token: &str, refresh_token: &str) -> AuthResult<Session>;

    /// Revoke the current session server-side.
    async fn sign_out(&self) -> AuthResult<()>;

    /// Send a password-reset email with the given redirect target.
    async fn reset_password_for_email(&self, email: &str, redirect_url: &str) -> AuthResult<()>;

    /// The current session, restoring from persisted state if needed.
    async fn get_session(&self) -> AuthResult<Option<Session>>;

    /// Subscribe to auth-state changes. Listeners are retained for the
    /// lifetime of the backend.
    fn on_auth_state_change(&self, listener: AuthChangeListener);

    /// Resume proactive token refresh (app foregrounded).
    async fn start_auto_refresh(&self);

    /// Suspend proactive token refresh (app backgrounded).
    async fn stop_auto_refresh(&self);
}

/// Read access to user profile rows.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Look up the admin flag for a user. `Ok(None)` means no profile row
    /// exists.
    async fn is_admin(&self, user_id: &str) -> AuthResult<Option<bool>>;
}

/// Write access to the push-token table.
#[async_trait]
pub trait PushTokenStore: Send + Sync {
    /// Upsert the device push token for a user, keyed on user ID.
    async fn upsert_push_token(&self, user_id: &str, token: &str) -> AuthResult<()>;
}

/// Outcome of a push-permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Platform push facilities: permission prompt and device token retrieval.
#[async_trait]
pub trait PushRelay: Send + Sync {
    /// Prompt (or re-check) push notification permission.
    async fn request_permission(&self) -> AuthResult<PermissionStatus>;

    /// The device push token. Only called after permission was granted.
    async fn device_token(&self) -> AuthResult<String>;
}
