//! Supabase GoTrue client implementing the identity backend.
//!
//! Covers the auth endpoints the app uses: password and PKCE token grants,
//! sign-up, sign-out, password recovery and the current-user lookup, plus a
//! background task that rotates the token pair ahead of expiry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use app_storage::PrefsManager;
use auth_engine::backend::{AuthChangeListener, IdentityBackend};
use auth_engine::{AuthChangeEvent, AuthChangeKind, AuthError, AuthResult, Session, User};

use crate::http::{map_transport, summarize_response_body};

/// How long before expiry the proactive refresh fires.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Expiry assumed for a session adopted from an access token alone.
const FALLBACK_EXPIRES_IN_SECS: i64 = 3600;

/// Configuration for retry behavior during token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms.saturating_mul(2u64.pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// GoTrue token grant response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: ApiUser,
}

/// GoTrue user record.
#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    app_metadata: serde_json::Value,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

impl ApiUser {
    fn into_user(self) -> User {
        let provider = self.app_metadata["provider"]
            .as_str()
            .map(|p| p.to_string());
        User {
            id: self.id,
            email: self.email,
            provider,
            user_metadata: self.user_metadata,
        }
    }
}

/// Sign-up response. With email confirmation enabled GoTrue returns the bare
/// user object and no tokens; with autoconfirm it returns a full grant.
#[derive(Debug, Deserialize)]
struct SignupResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<ApiUser>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    publishable_key: String,
    prefs: Arc<PrefsManager>,
    refresh_config: RefreshConfig,
    current: Mutex<Option<Session>>,
    listeners: Mutex<Vec<AuthChangeListener>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    session_ready: Notify,
}

/// Supabase auth client. Cheap to clone; clones share session state and the
/// refresh task.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    inner: Arc<Inner>,
}

impl SupabaseAuthClient {
    pub fn new(
        base_url: impl Into<String>,
        publishable_key: impl Into<String>,
        prefs: Arc<PrefsManager>,
    ) -> Self {
        Self::with_refresh_config(base_url, publishable_key, prefs, RefreshConfig::default())
    }

    pub fn with_refresh_config(
        base_url: impl Into<String>,
        publishable_key: impl Into<String>,
        prefs: Arc<PrefsManager>,
        refresh_config: RefreshConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                base_url: base_url.into(),
                publishable_key: publishable_key.into(),
                prefs,
                refresh_config,
                current: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                refresh_task: Mutex::new(None),
                session_ready: Notify::new(),
            }),
        }
    }

    /// The provider authorization URL for an OAuth flow.
    fn authorize_url(&self, provider: &str, redirect_url: &str) -> String {
        format!(
            "{}/auth/v1/authorize?provider={}&redirect_to={}",
            self.inner.base_url,
            provider,
            urlencode(redirect_url)
        )
    }
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

impl Inner {
    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn emit(&self, kind: AuthChangeKind, session: Option<Session>) {
        let event = AuthChangeEvent { kind, session };
        for listener in self.listeners.lock().unwrap().iter() {
            listener(event.clone());
        }
    }

    /// Adopt a session: update the in-memory slot, persist the tokens and
    /// notify listeners.
    fn store_session(&self, session: Session, kind: AuthChangeKind) {
        if let Err(e) = self.persist(&session) {
            warn!(error = %e, "failed to persist session tokens");
        }
        *self.current.lock().unwrap() = Some(session.clone());
        self.session_ready.notify_one();
        self.emit(kind, Some(session));
    }

    fn persist(&self, session: &Session) -> Result<(), app_storage::StorageError> {
        self.prefs.set_session(
            &session.access_token,
            &session.refresh_token,
            &session.user.id,
            session.user.email.as_deref(),
            &session.expires_at.to_rfc3339(),
        )
    }

    /// Drop the session locally without emitting.
    fn clear_local(&self) {
        *self.current.lock().unwrap() = None;
        if let Err(e) = self.prefs.clear_session() {
            warn!(error = %e, "failed to clear persisted session");
        }
    }

    fn session_from_grant(&self, resp: TokenResponse) -> Session {
        Session {
            expires_at: Utc::now() + chrono::Duration::seconds(resp.expires_in),
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            user: resp.user.into_user(),
        }
    }

    /// One token-grant request against `/auth/v1/token`.
    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> AuthResult<TokenResponse> {
        let url = format!("{}?grant_type={}", self.auth_url("token"), grant_type);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            debug!(status = %status, body_summary = %body_summary, grant_type, "token grant rejected");
            return Err(match (grant_type, status.as_u16()) {
                ("password", 400) => {
                    AuthError::InvalidCredentials(format!("{} ({})", status, body_summary))
                }
                ("refresh_token", 400 | 401) => {
                    AuthError::SessionInvalid(format!("refresh token rejected: {}", status))
                }
                ("pkce", _) => {
                    AuthError::OAuth(format!("code exchange failed: {} ({})", status, body_summary))
                }
                _ => AuthError::Backend(format!(
                    "token grant failed: {} ({})",
                    status, body_summary
                )),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Backend(format!("malformed token response: {e}")))
    }

    /// Single refresh attempt.
    async fn refresh_once(&self, refresh_token: &str) -> AuthResult<Session> {
        let resp = self
            .token_grant(
                "refresh_token",
                serde_json::json!({ "refresh_token": refresh_token }),
            )
            .await?;
        Ok(self.session_from_grant(resp))
    }

    /// Refresh with exponential backoff on transient failures.
    async fn refresh_with_backoff(&self, refresh_token: &str) -> AuthResult<Session> {
        for attempt in 0..=self.refresh_config.max_retries {
            match self.refresh_once(refresh_token).await {
                Ok(session) => return Ok(session),
                Err(e) if e.is_transient() && attempt < self.refresh_config.max_retries => {
                    let delay = self.refresh_config.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient refresh failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(AuthError::RefreshExhausted(self.refresh_config.max_retries))
    }

    /// Fetch the user for a bare access token.
    async fn fetch_user(&self, access_token: &str) -> AuthResult<ApiUser> {
        let response = self
            .http
            .get(self.auth_url("user"))
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await
            .map_err(map_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AuthError::SessionInvalid(format!(
                "access token rejected: {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Backend(format!("malformed user response: {e}")))
    }
}

/// Background loop that rotates the token pair shortly before expiry.
///
/// While there is no session the loop parks until one is adopted; a sign-in
/// that happens after the task was started still gets proactive refresh.
async fn auto_refresh_loop(inner: Arc<Inner>) {
    loop {
        let expires_at: Option<DateTime<Utc>> = inner
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.expires_at);
        let Some(expires_at) = expires_at else {
            debug!("auto refresh idle, waiting for a session");
            inner.session_ready.notified().await;
            continue;
        };

        let wake_at = expires_at - chrono::Duration::seconds(REFRESH_MARGIN_SECS);
        let sleep_for = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(sleep_for).await;

        let refresh_token = inner
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.refresh_token.clone());
        let Some(refresh_token) = refresh_token else {
            continue;
        };

        match inner.refresh_with_backoff(&refresh_token).await {
            Ok(session) => {
                info!(expires_at = %session.expires_at, "session tokens rotated");
                inner.store_session(session, AuthChangeKind::TokenRefreshed);
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, dropping session");
                inner.clear_local();
                inner.emit(AuthChangeKind::RefreshFailed, None);
            }
        }
    }
}

#[async_trait]
impl IdentityBackend for SupabaseAuthClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let resp = self
            .inner
            .token_grant(
                "password",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await?;
        let session = self.inner.session_from_grant(resp);
        info!(user_id = %session.user.id, "password sign-in succeeded");
        self.inner
            .store_session(session.clone(), AuthChangeKind::SignedIn);
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<serde_json::Value>,
        redirect_url: &str,
    ) -> AuthResult<Option<Session>> {
        let url = format!(
            "{}?redirect_to={}",
            self.inner.auth_url("signup"),
            urlencode(redirect_url)
        );
        let mut body = serde_json::json!({ "email": email, "password": password });
        if let Some(metadata) = metadata {
            body["data"] = metadata;
        }

        let response = self
            .inner
            .http
            .post(&url)
            .header("apikey", &self.inner.publishable_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            return Err(AuthError::Backend(format!(
                "sign-up failed: {} ({})",
                status, body_summary
            )));
        }

        let resp: SignupResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Backend(format!("malformed sign-up response: {e}")))?;

        match (resp.access_token, resp.refresh_token, resp.user) {
            (Some(access_token), Some(refresh_token), Some(user)) => {
                let session = Session {
                    access_token,
                    refresh_token,
                    expires_at: Utc::now()
                        + chrono::Duration::seconds(
                            resp.expires_in.unwrap_or(FALLBACK_EXPIRES_IN_SECS),
                        ),
                    user: user.into_user(),
                };
                info!(user_id = %session.user.id, "sign-up issued a session");
                self.inner
                    .store_session(session.clone(), AuthChangeKind::SignedIn);
                Ok(Some(session))
            }
            _ => {
                info!("sign-up pending email confirmation");
                Ok(None)
            }
        }
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_url: &str) -> AuthResult<String> {
        Ok(self.authorize_url(provider, redirect_url))
    }

    async fn exchange_code_for_session(&self, code: &str) -> AuthResult<Session> {
        let resp = self
            .inner
            .token_grant("pkce", serde_json::json!({ "auth_code": code }))
            .await?;
        let session = self.inner.session_from_grant(resp);
        info!(user_id = %session.user.id, "authorization code exchanged");
        self.inner
            .store_session(session.clone(), AuthChangeKind::SignedIn);
        Ok(session)
    }

    async fn set_session(&self, access_token: &str, refresh_token: &str) -> AuthResult<Session> {
        // With a refresh token we can mint a fresh pair; with only an access
        // token we look the user up and assume the default expiry.
        let session = if !refresh_token.is_empty() {
            self.inner.refresh_once(refresh_token).await?
        } else {
            let user = self.inner.fetch_user(access_token).await?;
            Session {
                access_token: access_token.to_string(),
                refresh_token: String::new(),
                expires_at: Utc::now() + chrono::Duration::seconds(FALLBACK_EXPIRES_IN_SECS),
                user: user.into_user(),
            }
        };
        info!(user_id = %session.user.id, "session adopted from redirect tokens");
        self.inner
            .store_session(session.clone(), AuthChangeKind::SignedIn);
        Ok(session)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let access_token = {
            let current = self.inner.current.lock().unwrap();
            current.as_ref().map(|s| s.access_token.clone())
        };
        let access_token = match access_token {
            Some(t) => Some(t),
            None => self.inner.prefs.get_access_token().unwrap_or(None),
        };

        let remote = match access_token {
            Some(token) => {
                let response = self
                    .inner
                    .http
                    .post(self.inner.auth_url("logout"))
                    .header("apikey", &self.inner.publishable_key)
                    .header("Authorization", format!("Bearer {token}"))
                    .send()
                    .await
                    .map_err(map_transport);
                match response {
                    Ok(response) if !response.status().is_success() => Err(AuthError::Backend(
                        format!("sign-out rejected: {}", response.status()),
                    )),
                    Ok(_) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            None => Ok(()),
        };

        self.stop_auto_refresh().await;
        self.inner.clear_local();
        self.inner.emit(AuthChangeKind::SignedOut, None);
        info!("signed out");
        remote
    }

    async fn reset_password_for_email(&self, email: &str, redirect_url: &str) -> AuthResult<()> {
        let url = format!(
            "{}?redirect_to={}",
            self.inner.auth_url("recover"),
            urlencode(redirect_url)
        );
        let response = self
            .inner
            .http
            .post(&url)
            .header("apikey", &self.inner.publishable_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(map_transport)?;

        if !response.status().is_success() {
            return Err(AuthError::Backend(format!(
                "password recovery failed: {}",
                response.status()
            )));
        }
        info!("password recovery email requested");
        Ok(())
    }

    async fn get_session(&self) -> AuthResult<Option<Session>> {
        if let Some(session) = self.inner.current.lock().unwrap().clone() {
            return Ok(Some(session));
        }

        let access_token = self.inner.prefs.get_access_token()?;
        let refresh_token = self.inner.prefs.get_refresh_token()?;
        let (Some(access_token), Some(refresh_token)) = (access_token, refresh_token) else {
            return Ok(None);
        };

        if !self.inner.prefs.is_session_expired()? {
            if let Some(meta) = self.inner.prefs.get_session_meta()? {
                let expires_at = DateTime::parse_from_rfc3339(&meta.expires_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                let session = Session {
                    access_token,
                    refresh_token,
                    expires_at,
                    user: User {
                        id: meta.user_id,
                        email: meta.email,
                        provider: None,
                        user_metadata: serde_json::Value::Null,
                    },
                };
                debug!(user_id = %session.user.id, "restored unexpired session from storage");
                *self.inner.current.lock().unwrap() = Some(session.clone());
                self.inner.session_ready.notify_one();
                return Ok(Some(session));
            }
        }

        // Stored tokens are expired or missing their metadata; try a refresh
        match self.inner.refresh_with_backoff(&refresh_token).await {
            Ok(session) => {
                info!(user_id = %session.user.id, "stored session refreshed at startup");
                if let Err(e) = self.inner.persist(&session) {
                    warn!(error = %e, "failed to persist refreshed session");
                }
                *self.inner.current.lock().unwrap() = Some(session.clone());
                self.inner.session_ready.notify_one();
                Ok(Some(session))
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                warn!(error = %e, "stored session could not be refreshed, clearing");
                self.inner.clear_local();
                Ok(None)
            }
        }
    }

    fn on_auth_state_change(&self, listener: AuthChangeListener) {
        self.inner.listeners.lock().unwrap().push(listener);
    }

    async fn start_auto_refresh(&self) {
        let mut task = self.inner.refresh_task.lock().unwrap();
        if task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return;
        }
        debug!("starting auto refresh task");
        let inner = self.inner.clone();
        *task = Some(tokio::spawn(auto_refresh_loop(inner)));
    }

    async fn stop_auto_refresh(&self) {
        let task = self.inner.refresh_task.lock().unwrap().take();
        if let Some(task) = task {
            debug!("stopping auto refresh task");
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_storage::MemoryStorage;

    fn client() -> SupabaseAuthClient {
        let prefs = Arc::new(PrefsManager::new(Box::new(MemoryStorage::new())));
        SupabaseAuthClient::new("https://example.supabase.co", "pk-test", prefs)
    }

    fn client_with_prefs() -> (SupabaseAuthClient, Arc<PrefsManager>) {
        let prefs = Arc::new(PrefsManager::new(Box::new(MemoryStorage::new())));
        (
            SupabaseAuthClient::new("https://example.supabase.co", "pk-test", prefs.clone()),
            prefs,
        )
    }

    #[test]
    fn test_authorize_url() {
        let url = client().authorize_url("google", "roadwatch://auth/callback");
        assert_eq!(
            url,
            "https://example.supabase.co/auth/v1/authorize?provider=google&redirect_to=roadwatch%3A%2F%2Fauth%2Fcallback"
        );
    }

    #[test]
    fn test_token_response_maps_to_session() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3600,
                "token_type": "bearer",
                "user": {
                    "id": "u-1",
                    "email": "rider@example.com",
                    "app_metadata": {"provider": "google"},
                    "user_metadata": {"full_name": "Rider"}
                }
            }"#,
        )
        .unwrap();

        let (client, _) = client_with_prefs();
        let session = client.inner.session_from_grant(resp);
        assert_eq!(session.access_token, "at");
        assert_eq!(session.user.id, "u-1");
        assert_eq!(session.user.provider.as_deref(), Some("google"));
        assert_eq!(session.user.user_metadata["full_name"], "Rider");
        assert!(session.expires_at > Utc::now());
    }

    #[test]
    fn test_signup_response_confirmation_mode() {
        // Confirmation mode: bare user object, no tokens
        let resp: SignupResponse = serde_json::from_str(
            r#"{"id": "u-1", "email": "rider@example.com"}"#,
        )
        .unwrap();
        assert!(resp.access_token.is_none());

        let resp: SignupResponse = serde_json::from_str(
            r#"{
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3600,
                "user": {"id": "u-1"}
            }"#,
        )
        .unwrap();
        assert_eq!(resp.access_token.as_deref(), Some("at"));
    }

    #[test]
    fn test_refresh_config_backoff() {
        let config = RefreshConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4000));
        // Capped
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_get_session_restores_unexpired_from_storage() {
        let (client, prefs) = client_with_prefs();
        prefs
            .set_session(
                "at",
                "rt",
                "u-1",
                Some("rider@example.com"),
                "2099-01-01T00:00:00Z",
            )
            .unwrap();

        let session = client.get_session().await.unwrap().unwrap();
        assert_eq!(session.access_token, "at");
        assert_eq!(session.user.id, "u-1");
        assert_eq!(session.user.email.as_deref(), Some("rider@example.com"));
    }

    #[tokio::test]
    async fn test_get_session_without_stored_tokens() {
        let (client, _) = client_with_prefs();
        assert!(client.get_session().await.unwrap().is_none());
    }

    fn refresh_task_finished(client: &SupabaseAuthClient) -> bool {
        client
            .inner
            .refresh_task
            .lock()
            .unwrap()
            .as_ref()
            .map(|t| t.is_finished())
            .unwrap_or(true)
    }

    #[tokio::test]
    async fn test_auto_refresh_outlives_a_sessionless_start() {
        let (client, _) = client_with_prefs();

        // Foregrounding while signed out starts the task with nothing to do
        client.start_auto_refresh().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(
            !refresh_task_finished(&client),
            "refresh task must idle while signed out, not exit"
        );

        // A sign-in adopts a session exactly like sign_in_with_password does;
        // the already-running task must pick it up
        let session = Session {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(8),
            user: User {
                id: "u-1".to_string(),
                email: None,
                provider: None,
                user_metadata: serde_json::Value::Null,
            },
        };
        client.inner.store_session(session, AuthChangeKind::SignedIn);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(
            !refresh_task_finished(&client),
            "refresh task must stay alive to rotate the new session"
        );

        client.stop_auto_refresh().await;
    }

    #[tokio::test]
    async fn test_oauth_start_needs_no_network() {
        let url = client()
            .sign_in_with_oauth("google", "roadwatch://auth/callback")
            .await
            .unwrap();
        assert!(url.starts_with("https://example.supabase.co/auth/v1/authorize"));
    }
}
