//! High-level API for locally persisted app state.

use crate::{KeyValueStore, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session metadata persisted alongside the token pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// User ID from Supabase Auth
    pub user_id: String,
    /// User email from Supabase Auth
    #[serde(default)]
    pub email: Option<String>,
    /// When the access token expires (ISO timestamp)
    pub expires_at: String,
}

/// High-level API for storing and retrieving local app state
pub struct PrefsManager {
    storage: Box<dyn KeyValueStore>,
}

impl PrefsManager {
    /// Create a new prefs manager with the given storage backend
    pub fn new(storage: Box<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    // ==========================================
    // Session tokens
    // ==========================================

    /// Store a full session (tokens plus metadata)
    pub fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        user_id: &str,
        email: Option<&str>,
        expires_at: &str,
    ) -> StorageResult<()> {
        self.storage.set(StorageKeys::ACCESS_TOKEN, access_token)?;
        self.storage.set(StorageKeys::REFRESH_TOKEN, refresh_token)?;
        self.set_session_meta(&SessionMeta {
            user_id: user_id.to_string(),
            email: email.map(|e| e.to_string()),
            expires_at: expires_at.to_string(),
        })
    }

    /// Retrieve the access token
    pub fn get_access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS_TOKEN)
    }

    /// Retrieve the refresh token
    pub fn get_refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::REFRESH_TOKEN)
    }

    /// Store session metadata
    pub fn set_session_meta(&self, meta: &SessionMeta) -> StorageResult<()> {
        let json = serde_json::to_string(meta)
            .map_err(|e| crate::StorageError::Encoding(e.to_string()))?;
        self.storage.set(StorageKeys::SESSION_META, &json)
    }

    /// Retrieve session metadata
    pub fn get_session_meta(&self) -> StorageResult<Option<SessionMeta>> {
        match self.storage.get(StorageKeys::SESSION_META)? {
            Some(json) => {
                let meta = serde_json::from_str(&json)
                    .map_err(|e| crate::StorageError::Encoding(e.to_string()))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Check whether a session is stored
    pub fn has_session(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::ACCESS_TOKEN)
    }

    /// Check whether the stored session has passed its expiry timestamp.
    /// A missing or unparseable timestamp counts as expired.
    pub fn is_session_expired(&self) -> StorageResult<bool> {
        let meta = match self.get_session_meta()? {
            Some(m) => m,
            None => return Ok(true),
        };
        match DateTime::parse_from_rfc3339(&meta.expires_at) {
            Ok(expires_at) => Ok(expires_at <= Utc::now()),
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable session expiry, treating as expired");
                Ok(true)
            }
        }
    }

    /// Remove tokens and metadata
    pub fn clear_session(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::ACCESS_TOKEN)?;
        self.storage.delete(StorageKeys::REFRESH_TOKEN)?;
        self.storage.delete(StorageKeys::SESSION_META)?;
        Ok(())
    }

    // ==========================================
    // Background timestamp
    // ==========================================

    /// Persist the moment the app entered the background
    pub fn set_background_entered_at(&self, at: DateTime<Utc>) -> StorageResult<()> {
        self.storage
            .set(StorageKeys::BACKGROUND_ENTERED_AT, &at.to_rfc3339())
    }

    /// Read the persisted backgrounding time, if any.
    /// An unparseable value is treated as absent (and logged).
    pub fn get_background_entered_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
        match self.storage.get(StorageKeys::BACKGROUND_ENTERED_AT)? {
            Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(at) => Ok(Some(at.with_timezone(&Utc))),
                Err(e) => {
                    tracing::warn!(error = %e, "Unparseable background timestamp, ignoring");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Remove the persisted backgrounding time
    pub fn clear_background_entered_at(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::BACKGROUND_ENTERED_AT)?;
        Ok(())
    }

    // ==========================================
    // App flags
    // ==========================================

    /// Mark the onboarding flow as complete
    pub fn set_onboarding_complete(&self, complete: bool) -> StorageResult<()> {
        self.storage
            .set(StorageKeys::ONBOARDING_COMPLETE, if complete { "1" } else { "0" })
    }

    /// Whether the onboarding flow has been completed
    pub fn is_onboarding_complete(&self) -> StorageResult<bool> {
        Ok(self
            .storage
            .get(StorageKeys::ONBOARDING_COMPLETE)?
            .as_deref()
            == Some("1"))
    }

    /// Store the preferred map style
    pub fn set_map_style(&self, style: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::MAP_STYLE, style)
    }

    /// Retrieve the preferred map style
    pub fn get_map_style(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::MAP_STYLE)
    }

    /// Cache the push token last registered for the signed-in user
    pub fn set_push_token_cache(&self, token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::PUSH_TOKEN_CACHE, token)
    }

    /// Retrieve the cached push token
    pub fn get_push_token_cache(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::PUSH_TOKEN_CACHE)
    }

    // ==========================================
    // Sign-out
    // ==========================================

    /// Remove every auth-scoped key: tokens, session metadata, background
    /// timestamp, onboarding/settings flags, and the cached push token.
    /// Sign-out calls this unconditionally, before any remote revoke result
    /// is known.
    pub fn clear_auth_scoped(&self) -> StorageResult<()> {
        self.clear_session()?;
        self.storage.delete(StorageKeys::BACKGROUND_ENTERED_AT)?;
        self.storage.delete(StorageKeys::ONBOARDING_COMPLETE)?;
        self.storage.delete(StorageKeys::MAP_STYLE)?;
        self.storage.delete(StorageKeys::PUSH_TOKEN_CACHE)?;
        Ok(())
    }
}
