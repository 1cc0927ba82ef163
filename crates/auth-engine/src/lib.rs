//! Session lifecycle engine: auth state machine, redirect handling,
//! admin-flag sync, push registration and the background timeout.
//!
//! The engine is backend-agnostic: everything network-facing sits behind the
//! traits in [`backend`], implemented by the gateway crate in production and
//! by in-memory doubles in tests.

pub mod admin;
pub mod auth_fsm;
pub mod backend;
pub mod dedup;
pub mod deep_link;
pub mod error;
pub mod exchange;
pub mod push;
pub mod session;
pub mod timeout;
pub mod types;

pub use admin::AdminStatusSync;
pub use auth_fsm::{AuthState, AuthStateChangedPayload};
pub use backend::{
    AuthChangeListener, IdentityBackend, PermissionStatus, ProfileStore, PushRelay,
    PushTokenStore,
};
pub use dedup::AuthEventGuard;
pub use deep_link::{parse_redirect, AuthRedirect};
pub use error::{AuthError, AuthResult};
pub use exchange::SessionExchange;
pub use push::PushTokenRegistrar;
pub use session::{AuthStateCallback, SessionConfig, SessionManager};
pub use timeout::{BackgroundTimeoutGuard, TimeoutVerdict};
pub use types::{AuthChangeEvent, AuthChangeKind, Session, User};
