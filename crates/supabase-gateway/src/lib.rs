//! Supabase implementations of the session engine's backend traits.
//!
//! [`SupabaseAuthClient`] talks to GoTrue (`/auth/v1`) and implements
//! [`auth_engine::IdentityBackend`]; [`SupabaseRestClient`] talks to
//! PostgREST (`/rest/v1`) and implements the profile and push-token stores.

mod auth_api;
mod http;
mod rest;

pub use auth_api::{RefreshConfig, SupabaseAuthClient};
pub use rest::SupabaseRestClient;
