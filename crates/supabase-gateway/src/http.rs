//! Shared HTTP plumbing for the auth and REST clients.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use auth_engine::AuthError;

/// Summarize a response body for logging without leaking its contents
/// (bodies can carry tokens and PII).
pub(crate) fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Map a transport-level reqwest error onto the engine's error taxonomy.
pub(crate) fn map_transport(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::Timeout
    } else if e.is_connect() {
        AuthError::NetworkUnavailable
    } else {
        AuthError::Backend(e.to_string())
    }
}
