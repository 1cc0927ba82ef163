//! PostgREST client for the profile and push-token tables.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use app_storage::PrefsManager;
use auth_engine::backend::{ProfileStore, PushTokenStore};
use auth_engine::{AuthError, AuthResult};

use crate::http::{map_transport, summarize_response_body};

/// Profile row projection for the admin lookup.
#[derive(Debug, Deserialize)]
struct ProfileRow {
    #[serde(default)]
    is_admin: bool,
}

/// Supabase REST client for the app's tables.
///
/// Requests are authenticated with the signed-in user's access token when one
/// is stored, falling back to the publishable key (row-level security then
/// rejects anything a signed-out client should not see).
#[derive(Clone)]
pub struct SupabaseRestClient {
    http: reqwest::Client,
    base_url: String,
    publishable_key: String,
    prefs: Arc<PrefsManager>,
}

impl SupabaseRestClient {
    pub fn new(
        base_url: impl Into<String>,
        publishable_key: impl Into<String>,
        prefs: Arc<PrefsManager>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            publishable_key: publishable_key.into(),
            prefs,
        }
    }

    /// Build the REST API URL for a table.
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn bearer_token(&self) -> String {
        self.prefs
            .get_access_token()
            .unwrap_or(None)
            .unwrap_or_else(|| self.publishable_key.clone())
    }
}

#[async_trait]
impl ProfileStore for SupabaseRestClient {
    async fn is_admin(&self, user_id: &str) -> AuthResult<Option<bool>> {
        let url = format!(
            "{}?id=eq.{}&select=is_admin&limit=1",
            self.rest_url("profiles"),
            user_id
        );

        debug!(user_id, "fetching profile admin flag");

        let response = self
            .http
            .get(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", self.bearer_token()))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(map_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            return Err(AuthError::Backend(format!(
                "profile lookup failed: {} ({})",
                status, body_summary
            )));
        }

        let rows: Vec<ProfileRow> = response
            .json()
            .await
            .map_err(|e| AuthError::Backend(format!("malformed profile response: {e}")))?;
        Ok(rows.into_iter().next().map(|row| row.is_admin))
    }
}

#[async_trait]
impl PushTokenStore for SupabaseRestClient {
    async fn upsert_push_token(&self, user_id: &str, token: &str) -> AuthResult<()> {
        let url = format!("{}?on_conflict=user_id", self.rest_url("push_tokens"));
        let body = serde_json::json!({
            "user_id": user_id,
            "token": token,
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", self.bearer_token()))
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates")
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            return Err(AuthError::PushRegistration(format!(
                "push token upsert failed: {} ({})",
                status, body_summary
            )));
        }

        info!(user_id, "push token upserted");
        Ok(())
    }
}
