//! Push-token registration after sign-in.

use std::sync::Arc;

use tracing::{debug, info, warn};

use app_storage::PrefsManager;

use crate::backend::{PermissionStatus, PushRelay, PushTokenStore};
use crate::error::AuthResult;
use crate::types::User;

/// Registers the device push token for the signed-in user.
///
/// Permission denial is a normal outcome, not an error; registration
/// failures must never fail the sign-in that triggered them, so callers
/// treat errors from [`register`](PushTokenRegistrar::register) as
/// best-effort.
pub struct PushTokenRegistrar {
    relay: Arc<dyn PushRelay>,
    store: Arc<dyn PushTokenStore>,
    prefs: Arc<PrefsManager>,
}

impl PushTokenRegistrar {
    pub fn new(
        relay: Arc<dyn PushRelay>,
        store: Arc<dyn PushTokenStore>,
        prefs: Arc<PrefsManager>,
    ) -> Self {
        Self {
            relay,
            store,
            prefs,
        }
    }

    /// Request permission, fetch the device token and upsert it for `user`.
    ///
    /// Returns `Ok(None)` when permission was denied.
    pub async fn register(&self, user: &User) -> AuthResult<Option<String>> {
        match self.relay.request_permission().await? {
            PermissionStatus::Denied => {
                debug!(user_id = %user.id, "push permission denied, skipping registration");
                return Ok(None);
            }
            PermissionStatus::Granted => {}
        }

        let token = self.relay.device_token().await?;
        self.store.upsert_push_token(&user.id, &token).await?;

        if let Err(e) = self.prefs.set_push_token_cache(&token) {
            warn!(error = %e, "failed to cache push token locally");
        }

        info!(user_id = %user.id, "push token registered");
        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use app_storage::MemoryStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubRelay {
        status: PermissionStatus,
        token: String,
    }

    #[async_trait]
    impl PushRelay for StubRelay {
        async fn request_permission(&self) -> AuthResult<PermissionStatus> {
            Ok(self.status)
        }

        async fn device_token(&self) -> AuthResult<String> {
            Ok(self.token.clone())
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        upserts: Mutex<Vec<(String, String)>>,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PushTokenStore for RecordingStore {
        async fn upsert_push_token(&self, user_id: &str, token: &str) -> AuthResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AuthError::PushRegistration("upsert failed".to_string()));
            }
            self.upserts
                .lock()
                .unwrap()
                .push((user_id.to_string(), token.to_string()));
            Ok(())
        }
    }

    fn user() -> User {
        User {
            id: "u-1".to_string(),
            email: None,
            provider: None,
            user_metadata: serde_json::Value::Null,
        }
    }

    fn registrar(
        status: PermissionStatus,
        store: Arc<RecordingStore>,
    ) -> (PushTokenRegistrar, Arc<PrefsManager>) {
        let prefs = Arc::new(PrefsManager::new(Box::new(MemoryStorage::new())));
        let relay = Arc::new(StubRelay {
            status,
            token: "expo-token-1".to_string(),
        });
        (
            PushTokenRegistrar::new(relay, store, prefs.clone()),
            prefs,
        )
    }

    #[tokio::test]
    async fn test_granted_registers_and_caches() {
        let store = Arc::new(RecordingStore::default());
        let (registrar, prefs) = registrar(PermissionStatus::Granted, store.clone());

        let token = registrar.register(&user()).await.unwrap();
        assert_eq!(token.as_deref(), Some("expo-token-1"));
        assert_eq!(
            store.upserts.lock().unwrap().as_slice(),
            &[("u-1".to_string(), "expo-token-1".to_string())]
        );
        assert_eq!(
            prefs.get_push_token_cache().unwrap().as_deref(),
            Some("expo-token-1")
        );
    }

    #[tokio::test]
    async fn test_denied_skips_registration() {
        let store = Arc::new(RecordingStore::default());
        let (registrar, prefs) = registrar(PermissionStatus::Denied, store.clone());

        let token = registrar.register(&user()).await.unwrap();
        assert!(token.is_none());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert!(prefs.get_push_token_cache().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_failure_surfaces_error() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let (registrar, prefs) = registrar(PermissionStatus::Granted, store);

        let result = registrar.register(&user()).await;
        assert!(matches!(result, Err(AuthError::PushRegistration(_))));
        assert!(prefs.get_push_token_cache().unwrap().is_none());
    }
}
