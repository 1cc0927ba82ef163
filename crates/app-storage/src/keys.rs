//! Storage key constants.

/// Storage keys used by the app core
pub struct StorageKeys;

impl StorageKeys {
    /// Wall-clock time the app last entered the background (RFC3339)
    pub const BACKGROUND_ENTERED_AT: &'static str = "background_entered_at";

    /// Whether the onboarding flow has been completed
    pub const ONBOARDING_COMPLETE: &'static str = "onboarding_complete";

    /// Preferred map style for the report map screen
    pub const MAP_STYLE: &'static str = "map_style";

    /// Supabase access token
    pub const ACCESS_TOKEN: &'static str = "supabase_access_token";

    /// Supabase refresh token
    pub const REFRESH_TOKEN: &'static str = "supabase_refresh_token";

    /// Session metadata (JSON)
    pub const SESSION_META: &'static str = "supabase_session_meta";

    /// Last push token registered for the signed-in user
    pub const PUSH_TOKEN_CACHE: &'static str = "push_token_cache";
}
