//! Session lifecycle management with FSM-based state tracking.
//!
//! This module provides a `SessionManager` that uses an internal finite
//! state machine to track authentication state explicitly, rather than
//! deriving it from storage checks. Backend auth-change events and local
//! operation results both feed the same FSM; transitions are written to be
//! idempotent so the two channels can overlap safely, with the most recent
//! event winning.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use app_storage::PrefsManager;

use crate::admin::AdminStatusSync;
use crate::auth_fsm::{
    AuthState, AuthStateChangedPayload, SessionMachine, SessionMachineInput,
};
use crate::backend::{IdentityBackend, ProfileStore, PushRelay, PushTokenStore};
use crate::dedup::{AuthEventGuard, DEFAULT_DEDUP_LEASE};
use crate::deep_link::{parse_redirect, AuthRedirect};
use crate::error::{AuthError, AuthResult};
use crate::exchange::SessionExchange;
use crate::push::PushTokenRegistrar;
use crate::timeout::{BackgroundTimeoutGuard, TimeoutVerdict, DEFAULT_BACKGROUND_TIMEOUT};
use crate::types::{AuthChangeEvent, AuthChangeKind, Session};

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

/// Tunable lifecycle durations and redirect targets.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Background duration after which the session is torn down.
    pub background_timeout: Duration,
    /// How long a redirect-handling lease is held before it expires.
    pub dedup_lease: Duration,
    /// Where OAuth and sign-up confirmation redirects land.
    pub oauth_redirect_url: String,
    /// Where password-reset emails redirect.
    pub password_reset_redirect_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            background_timeout: DEFAULT_BACKGROUND_TIMEOUT,
            dedup_lease: DEFAULT_DEDUP_LEASE,
            oauth_redirect_url: "roadwatch://auth/callback".to_string(),
            password_reset_redirect_url: "roadwatch://auth/reset-password".to_string(),
        }
    }
}

/// State shared between the manager and the backend event listener.
struct Shared {
    fsm: Mutex<SessionMachine>,
    session: Arc<Mutex<Option<Session>>>,
    last_auth_error: Mutex<Option<String>>,
    state_callback: Mutex<Option<AuthStateCallback>>,
    admin: Arc<AdminStatusSync>,
}

impl Shared {
    /// Apply an auth-change event: update the session slot, drive the FSM
    /// and notify the callback if the visible state changed.
    fn apply_event(&self, event: &AuthChangeEvent) {
        let input = if event.session.is_some() {
            SessionMachineInput::SignedIn
        } else {
            SessionMachineInput::SignedOut
        };

        *self.session.lock().unwrap() = event.session.clone();
        if event.session.is_none() {
            self.admin.set_absent();
        }

        self.transition(&input, event);
    }

    fn transition(&self, input: &SessionMachineInput, event: &AuthChangeEvent) {
        let mut fsm = self.fsm.lock().unwrap();
        let old_state = AuthState::from(fsm.state());

        if fsm.consume(input).is_err() {
            // An event raced ahead of the startup transition; the session
            // slot is already updated, so just log and move on
            warn!(
                kind = ?event.kind,
                state = ?old_state,
                "dropping auth event the state machine cannot accept"
            );
            return;
        }

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                kind = ?event.kind,
                "auth state transition"
            );
            self.notify_state_change(new_state);
        }
    }

    fn notify_state_change(&self, state: AuthState) {
        let cb = self.state_callback.lock().unwrap();
        if let Some(callback) = cb.as_ref() {
            let (user_id, email) = self
                .session
                .lock()
                .unwrap()
                .as_ref()
                .map(|s| (Some(s.user.id.clone()), s.user.email.clone()))
                .unwrap_or((None, None));

            callback(AuthStateChangedPayload {
                state,
                user_id,
                email,
            });
        }
    }
}

/// Session lifecycle manager.
///
/// Owns the session state machine and orchestrates everything that hangs off
/// an auth change: admin-flag refresh, push-token registration, redirect
/// handling and the background timeout. The backend's auth-change event
/// stream keeps the FSM in sync with refreshes and revocations that happen
/// outside any local operation.
pub struct SessionManager {
    backend: Arc<dyn IdentityBackend>,
    prefs: Arc<PrefsManager>,
    shared: Arc<Shared>,
    exchange: SessionExchange,
    redirect_guard: AuthEventGuard,
    timeout_guard: BackgroundTimeoutGuard,
    push: PushTokenRegistrar,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn IdentityBackend>,
        profiles: Arc<dyn ProfileStore>,
        push_store: Arc<dyn PushTokenStore>,
        push_relay: Arc<dyn PushRelay>,
        prefs: Arc<PrefsManager>,
        config: SessionConfig,
    ) -> Self {
        let session = Arc::new(Mutex::new(None));
        let admin = Arc::new(AdminStatusSync::new(profiles));
        let shared = Arc::new(Shared {
            fsm: Mutex::new(SessionMachine::new()),
            session: session.clone(),
            last_auth_error: Mutex::new(None),
            state_callback: Mutex::new(None),
            admin,
        });

        Self {
            exchange: SessionExchange::new(backend.clone(), session),
            redirect_guard: AuthEventGuard::new(config.dedup_lease),
            timeout_guard: BackgroundTimeoutGuard::new(prefs.clone(), config.background_timeout),
            push: PushTokenRegistrar::new(push_relay, push_store, prefs.clone()),
            backend,
            prefs,
            shared,
            config,
        }
    }

    /// Set a callback to be notified of auth state changes.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        let mut cb = self.shared.state_callback.lock().unwrap();
        *cb = Some(callback);
    }

    /// Resolve persisted auth state and start listening for backend events.
    ///
    /// Must be called exactly once before any other operation. The FSM moves
    /// through `Loading` and lands on `Authenticated` or `Anonymous`
    /// depending on whether the backend restores a session.
    pub async fn init(&self) -> AuthResult<AuthState> {
        {
            let mut fsm = self.shared.fsm.lock().unwrap();
            fsm.consume(&SessionMachineInput::StartupLookup).map_err(|_| {
                AuthError::InvalidStateTransition("init called more than once".to_string())
            })?;
        }

        let shared = self.shared.clone();
        self.backend.on_auth_state_change(Box::new(move |event| {
            shared.apply_event(&event);
        }));

        let session = self.backend.get_session().await?;
        info!(restored = session.is_some(), "startup session lookup complete");

        self.shared.apply_event(&AuthChangeEvent {
            kind: AuthChangeKind::InitialSession,
            session: session.clone(),
        });

        if let Some(session) = session {
            self.shared.admin.recompute(Some(&session.user)).await;
            if let Err(e) = self.push.register(&session.user).await {
                warn!(error = %e, "push registration failed during startup");
            }
        }

        Ok(self.state())
    }

    /// The current lifecycle state.
    pub fn state(&self) -> AuthState {
        let fsm = self.shared.fsm.lock().unwrap();
        AuthState::from(fsm.state())
    }

    /// The current session, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.shared.session.lock().unwrap().clone()
    }

    /// Whether the current user is an admin. False while anonymous.
    pub fn is_admin(&self) -> bool {
        self.shared.admin.is_admin()
    }

    /// Re-run the admin lookup for the current user and return the fresh
    /// flag. Useful right after sign-in, before a navigation decision that
    /// depends on it. Resolves to false while anonymous without a lookup.
    pub async fn refresh_admin(&self) -> bool {
        let user = self
            .shared
            .session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.user.clone());
        self.shared.admin.recompute(user.as_ref()).await;
        self.shared.admin.is_admin()
    }

    /// The last redirect-handling error, if the most recent redirect failed.
    pub fn last_auth_error(&self) -> Option<String> {
        self.shared.last_auth_error.lock().unwrap().clone()
    }

    /// Sign in with email and password.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        info!("signing in with password");
        let session = self.backend.sign_in_with_password(email, password).await?;
        self.adopt_session(&session).await;
        Ok(session)
    }

    /// Create an account.
    ///
    /// Returns `None` when the backend requires email confirmation; the
    /// session then arrives later via the confirmation redirect.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<serde_json::Value>,
    ) -> AuthResult<Option<Session>> {
        info!("signing up");
        let session = self
            .backend
            .sign_up(email, password, metadata, &self.config.oauth_redirect_url)
            .await?;

        match &session {
            Some(session) => self.adopt_session(session).await,
            None => info!("sign-up requires email confirmation"),
        }
        Ok(session)
    }

    /// Begin a Google OAuth flow. Returns the authorization URL the shell
    /// must open; the flow completes via [`handle_redirect_url`].
    ///
    /// [`handle_redirect_url`]: SessionManager::handle_redirect_url
    pub async fn sign_in_with_google(&self) -> AuthResult<String> {
        info!("starting google oauth flow");
        self.backend
            .sign_in_with_oauth("google", &self.config.oauth_redirect_url)
            .await
    }

    /// Send a password-reset email.
    pub async fn reset_password(&self, email: &str) -> AuthResult<()> {
        self.backend
            .reset_password_for_email(email, &self.config.password_reset_redirect_url)
            .await
    }

    /// Handle a redirect URL delivered by the embedding shell.
    ///
    /// Returns `Ok(false)` when the redirect was dropped as a duplicate
    /// (another delivery of the same URL is already being handled), and
    /// `Ok(true)` when it produced a session. A redirect that reaches the
    /// auth callback with no usable material is an error; the error is also
    /// parked in [`last_auth_error`](SessionManager::last_auth_error) for
    /// the UI to surface.
    pub async fn handle_redirect_url(&self, url: &str) -> AuthResult<bool> {
        if !self.redirect_guard.try_acquire() {
            return Ok(false);
        }

        let result = self.handle_redirect_inner(url).await;
        self.redirect_guard.release();

        match result {
            Ok(session) => {
                *self.shared.last_auth_error.lock().unwrap() = None;
                self.adopt_session(&session).await;
                Ok(true)
            }
            Err(e) => {
                *self.shared.last_auth_error.lock().unwrap() = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn handle_redirect_inner(&self, url: &str) -> AuthResult<Session> {
        match parse_redirect(url) {
            AuthRedirect::AuthCode(code) => self.exchange.exchange_code(&code).await,
            AuthRedirect::TokenPair {
                access_token,
                refresh_token,
            } => {
                self.exchange
                    .adopt_tokens(&access_token, refresh_token.as_deref())
                    .await
            }
            AuthRedirect::NoAuthData => Err(AuthError::OAuth(
                "redirect carried no auth material".to_string(),
            )),
        }
    }

    /// Sign out.
    ///
    /// Local state is torn down unconditionally, then the backend revocation
    /// result is surfaced: even when the server call fails, this device
    /// holds no credentials afterwards.
    pub async fn sign_out(&self) -> AuthResult<()> {
        info!("signing out");
        if let Err(e) = self.prefs.clear_auth_scoped() {
            warn!(error = %e, "failed to clear auth-scoped storage");
        }

        let remote = self.backend.sign_out().await;

        self.shared.apply_event(&AuthChangeEvent {
            kind: AuthChangeKind::SignedOut,
            session: None,
        });

        if let Err(e) = &remote {
            warn!(error = %e, "server-side sign-out failed, local state cleared anyway");
        }
        remote
    }

    /// The app entered the background: pause token refresh and stamp the
    /// moment for the foreground timeout check.
    pub async fn on_background(&self) {
        debug!("app entering background");
        self.backend.stop_auto_refresh().await;
        self.timeout_guard.note_background();
    }

    /// The app returned to the foreground: resume token refresh and tear the
    /// session down if the background stint exceeded the timeout.
    pub async fn on_foreground(&self) {
        debug!("app entering foreground");
        self.backend.start_auto_refresh().await;

        match self.timeout_guard.check_foreground() {
            TimeoutVerdict::Expired(elapsed) => {
                info!(
                    elapsed_secs = elapsed.as_secs(),
                    "background timeout exceeded, signing out"
                );
                if let Err(e) = self.sign_out().await {
                    warn!(error = %e, "timeout sign-out failed remotely");
                }
            }
            TimeoutVerdict::Within(elapsed) => {
                debug!(elapsed_secs = elapsed.as_secs(), "background stint within timeout");
            }
            TimeoutVerdict::NoCheckOwed => {}
        }
    }

    /// Adopt a freshly obtained session and run its follow-ups.
    async fn adopt_session(&self, session: &Session) {
        self.shared.apply_event(&AuthChangeEvent {
            kind: AuthChangeKind::SignedIn,
            session: Some(session.clone()),
        });

        self.shared.admin.recompute(Some(&session.user)).await;

        // Best effort: a push failure must never fail the sign-in
        if let Err(e) = self.push.register(&session.user).await {
            warn!(error = %e, "push registration failed after sign-in");
        }
    }
}
