//! Composition root: wires configuration, storage, the Supabase clients and
//! the session manager into a ready-to-init application core.
//!
//! The mobile shell calls [`bootstrap`] once at startup and then drives the
//! returned [`SessionManager`] (`init`, foreground/background hooks,
//! redirect delivery).

use std::sync::Arc;

use tracing::info;

use app_storage::{create_prefs_manager, PrefsManager};
use auth_engine::{SessionConfig, SessionManager};
use supabase_gateway::{SupabaseAuthClient, SupabaseRestClient};

use crate::config::Config;
use crate::error::CoreResult;
use crate::logging::init_logging;
use crate::paths::Paths;

/// The assembled application core.
pub struct AppCore {
    pub config: Config,
    pub paths: Paths,
    pub prefs: Arc<PrefsManager>,
    pub session: Arc<SessionManager>,
}

/// Assemble the application core under the default base directory.
pub fn bootstrap() -> CoreResult<AppCore> {
    bootstrap_with(Paths::new()?, SessionConfig::default())
}

/// Assemble the application core with explicit paths and session tuning.
pub fn bootstrap_with(paths: Paths, session_config: SessionConfig) -> CoreResult<AppCore> {
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;
    init_logging(&config.log_level);
    info!(base_dir = %paths.base_dir().display(), "bootstrapping app core");

    let prefs = Arc::new(create_prefs_manager(paths.prefs_file()));
    let auth = Arc::new(SupabaseAuthClient::new(
        &config.supabase_url,
        &config.supabase_publishable_key,
        prefs.clone(),
    ));
    let rest = Arc::new(SupabaseRestClient::new(
        &config.supabase_url,
        &config.supabase_publishable_key,
        prefs.clone(),
    ));

    let session = Arc::new(SessionManager::new(
        auth,
        rest.clone(),
        rest,
        Arc::new(shell_relay::PendingPushRelay),
        prefs.clone(),
        session_config,
    ));

    Ok(AppCore {
        config,
        paths,
        prefs,
        session,
    })
}

mod shell_relay {
    //! Placeholder push relay until the shell registers the platform one.

    use async_trait::async_trait;
    use auth_engine::backend::{PermissionStatus, PushRelay};
    use auth_engine::AuthResult;

    /// Relay that reports permission as denied, so push registration is
    /// skipped until the shell wires the real platform relay.
    pub struct PendingPushRelay;

    #[async_trait]
    impl PushRelay for PendingPushRelay {
        async fn request_permission(&self) -> AuthResult<PermissionStatus> {
            Ok(PermissionStatus::Denied)
        }

        async fn device_token(&self) -> AuthResult<String> {
            unreachable!("permission is always denied")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_engine::AuthState;
    use tempfile::TempDir;

    #[test]
    fn test_bootstrap_creates_dirs_and_config() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("roadwatch"));

        let core = bootstrap_with(paths, SessionConfig::default()).unwrap();
        assert!(core.paths.base_dir().exists());
        assert!(!core.config.supabase_url.is_empty());
        assert_eq!(core.session.state(), AuthState::Uninitialized);
    }

    #[test]
    fn test_bootstrap_prefs_are_empty_on_first_run() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("roadwatch"));

        let core = bootstrap_with(paths, SessionConfig::default()).unwrap();
        assert!(core.prefs.get_access_token().unwrap().is_none());
        assert!(!core.prefs.is_onboarding_complete().unwrap());
    }
}
