//! Conversion of redirect auth material into backend sessions.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::backend::IdentityBackend;
use crate::error::AuthResult;
use crate::types::Session;

/// Turns authorization codes and fragment token pairs into live sessions.
///
/// Shares the current-session slot with the lifecycle manager so adopting a
/// token pair the backend already holds is a cheap no-op instead of a second
/// network round trip.
pub struct SessionExchange {
    backend: Arc<dyn IdentityBackend>,
    current: Arc<Mutex<Option<Session>>>,
}

impl SessionExchange {
    pub fn new(backend: Arc<dyn IdentityBackend>, current: Arc<Mutex<Option<Session>>>) -> Self {
        Self { backend, current }
    }

    /// Redeem a PKCE authorization code for a session.
    pub async fn exchange_code(&self, code: &str) -> AuthResult<Session> {
        info!("exchanging authorization code for session");
        self.backend.exchange_code_for_session(code).await
    }

    /// Adopt a fragment-delivered token pair as the current session.
    ///
    /// Idempotent against replays: if the current session already carries
    /// exactly this token pair it is returned as-is without touching the
    /// backend. A redirect with no refresh token is handed to the backend
    /// with an empty one; the backend resolves the user from the access
    /// token alone.
    pub async fn adopt_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> AuthResult<Session> {
        let refresh_token = refresh_token.unwrap_or_default();

        {
            let current = self.current.lock().unwrap();
            if let Some(session) = current.as_ref() {
                if session.same_tokens(access_token, refresh_token) {
                    debug!("token pair already current, skipping set_session");
                    return Ok(session.clone());
                }
            }
        }

        info!("adopting redirect token pair as session");
        self.backend.set_session(access_token, refresh_token).await
    }
}
