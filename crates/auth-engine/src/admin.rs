//! Admin-flag synchronization against the profile store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::ProfileStore;
use crate::types::User;

/// Caches the admin flag for the current user.
///
/// The flag defaults to false and only becomes true after a successful
/// profile lookup says so. Lookup failures and missing profile rows both
/// resolve to false; a flaky profiles table must never grant admin UI.
pub struct AdminStatusSync {
    profiles: Arc<dyn ProfileStore>,
    is_admin: AtomicBool,
}

impl AdminStatusSync {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            profiles,
            is_admin: AtomicBool::new(false),
        }
    }

    /// Recompute the cached flag for the given user (or its absence).
    pub async fn recompute(&self, user: Option<&User>) {
        let Some(user) = user else {
            self.is_admin.store(false, Ordering::SeqCst);
            return;
        };

        let flag = match self.profiles.is_admin(&user.id).await {
            Ok(Some(flag)) => flag,
            Ok(None) => {
                debug!(user_id = %user.id, "no profile row, treating as non-admin");
                false
            }
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "admin lookup failed, treating as non-admin");
                false
            }
        };
        self.is_admin.store(flag, Ordering::SeqCst);
    }

    /// Reset the flag for a signed-out user.
    pub fn set_absent(&self) {
        self.is_admin.store(false, Ordering::SeqCst);
    }

    /// The cached flag.
    pub fn is_admin(&self) -> bool {
        self.is_admin.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthError, AuthResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapProfiles {
        rows: Mutex<HashMap<String, bool>>,
        fail: bool,
    }

    impl MapProfiles {
        fn with(rows: &[(&str, bool)]) -> Self {
            Self {
                rows: Mutex::new(
                    rows.iter()
                        .map(|(id, flag)| (id.to_string(), *flag))
                        .collect(),
                ),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ProfileStore for MapProfiles {
        async fn is_admin(&self, user_id: &str) -> AuthResult<Option<bool>> {
            if self.fail {
                return Err(AuthError::Backend("profiles unavailable".to_string()));
            }
            Ok(self.rows.lock().unwrap().get(user_id).copied())
        }
    }

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: None,
            provider: None,
            user_metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_admin_user_resolves_true() {
        let sync = AdminStatusSync::new(Arc::new(MapProfiles::with(&[("u-1", true)])));
        sync.recompute(Some(&user("u-1"))).await;
        assert!(sync.is_admin());
    }

    #[tokio::test]
    async fn test_missing_profile_row_resolves_false() {
        let sync = AdminStatusSync::new(Arc::new(MapProfiles::with(&[])));
        sync.recompute(Some(&user("u-1"))).await;
        assert!(!sync.is_admin());
    }

    #[tokio::test]
    async fn test_lookup_failure_resolves_false() {
        let sync = AdminStatusSync::new(Arc::new(MapProfiles::failing()));
        sync.recompute(Some(&user("u-1"))).await;
        assert!(!sync.is_admin());
    }

    #[tokio::test]
    async fn test_no_user_resolves_false_without_lookup() {
        // Failing store proves no lookup happens: a call would error but the
        // flag must still land on false without one
        let sync = AdminStatusSync::new(Arc::new(MapProfiles::failing()));
        sync.recompute(None).await;
        assert!(!sync.is_admin());
    }

    #[tokio::test]
    async fn test_sign_out_clears_flag() {
        let sync = AdminStatusSync::new(Arc::new(MapProfiles::with(&[("u-1", true)])));
        sync.recompute(Some(&user("u-1"))).await;
        assert!(sync.is_admin());
        sync.set_absent();
        assert!(!sync.is_admin());
    }
}
