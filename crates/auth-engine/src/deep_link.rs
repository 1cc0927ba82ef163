//! Parsing of OAuth redirect URLs into auth material.
//!
//! Redirects arrive either as custom-scheme deep links
//! (`roadwatch://auth/callback?...`) or as https callback URLs. Auth
//! material can ride in either the query string (PKCE `code`) or the URL
//! fragment (implicit-flow token pair).

use tracing::{debug, warn};
use url::Url;

/// Auth material extracted from a redirect URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRedirect {
    /// A PKCE authorization code to be exchanged for a session.
    AuthCode(String),
    /// An implicit-flow token pair delivered in the URL fragment.
    TokenPair {
        access_token: String,
        refresh_token: Option<String>,
    },
    /// The URL carried no usable auth material.
    NoAuthData,
}

/// Extract auth material from a redirect URL.
///
/// Total over its input: malformed URLs and URLs without auth material both
/// yield [`AuthRedirect::NoAuthData`] rather than an error. When both a
/// `code` query parameter and fragment tokens are present the code wins.
pub fn parse_redirect(raw: &str) -> AuthRedirect {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "ignoring malformed redirect url");
            return AuthRedirect::NoAuthData;
        }
    };

    if !is_auth_callback(&url) {
        debug!(scheme = url.scheme(), "redirect url is not an auth callback");
        return AuthRedirect::NoAuthData;
    }

    // PKCE code takes priority over fragment tokens
    if let Some(code) = query_param(&url, "code") {
        if !code.is_empty() {
            debug!("redirect carries an authorization code");
            return AuthRedirect::AuthCode(code);
        }
    }

    if let Some(fragment) = url.fragment() {
        let mut access_token = None;
        let mut refresh_token = None;
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            match key.as_ref() {
                "access_token" if !value.is_empty() => {
                    access_token = Some(value.into_owned());
                }
                "refresh_token" if !value.is_empty() => {
                    refresh_token = Some(value.into_owned());
                }
                _ => {}
            }
        }
        if let Some(access_token) = access_token {
            debug!("redirect carries fragment tokens");
            return AuthRedirect::TokenPair {
                access_token,
                refresh_token,
            };
        }
    }

    AuthRedirect::NoAuthData
}

/// Whether the URL targets the auth callback route.
///
/// Matches both the custom scheme (`roadwatch://auth/callback`, where `auth`
/// parses as the host) and https callbacks (`.../auth/v1/callback`).
fn is_auth_callback(url: &Url) -> bool {
    let host = url.host_str().unwrap_or("");
    let path = url.path();
    (host == "auth" && path.contains("callback"))
        || (path.contains("auth") && path.contains("callback"))
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkce_code_in_query() {
        let parsed = parse_redirect("roadwatch://auth/callback?code=abc123");
        assert_eq!(parsed, AuthRedirect::AuthCode("abc123".to_string()));
    }

    #[test]
    fn test_token_pair_in_fragment() {
        let parsed =
            parse_redirect("roadwatch://auth/callback#access_token=at&refresh_token=rt&token_type=bearer");
        assert_eq!(
            parsed,
            AuthRedirect::TokenPair {
                access_token: "at".to_string(),
                refresh_token: Some("rt".to_string()),
            }
        );
    }

    #[test]
    fn test_fragment_tokens_without_refresh_token() {
        let parsed = parse_redirect("roadwatch://auth/callback#access_token=at");
        assert_eq!(
            parsed,
            AuthRedirect::TokenPair {
                access_token: "at".to_string(),
                refresh_token: None,
            }
        );
    }

    #[test]
    fn test_code_wins_over_fragment_tokens() {
        let parsed = parse_redirect("roadwatch://auth/callback?code=abc#access_token=at");
        assert_eq!(parsed, AuthRedirect::AuthCode("abc".to_string()));
    }

    #[test]
    fn test_https_callback_url() {
        let parsed =
            parse_redirect("https://example.supabase.co/auth/v1/callback?code=xyz");
        assert_eq!(parsed, AuthRedirect::AuthCode("xyz".to_string()));
    }

    #[test]
    fn test_callback_without_auth_material() {
        let parsed = parse_redirect("roadwatch://auth/callback");
        assert_eq!(parsed, AuthRedirect::NoAuthData);
    }

    #[test]
    fn test_non_callback_deep_link() {
        let parsed = parse_redirect("roadwatch://report/42?code=abc");
        assert_eq!(parsed, AuthRedirect::NoAuthData);
    }

    #[test]
    fn test_malformed_url_yields_no_auth_data() {
        assert_eq!(parse_redirect("not a url"), AuthRedirect::NoAuthData);
        assert_eq!(parse_redirect(""), AuthRedirect::NoAuthData);
    }

    #[test]
    fn test_empty_code_is_ignored() {
        let parsed = parse_redirect("roadwatch://auth/callback?code=");
        assert_eq!(parsed, AuthRedirect::NoAuthData);
    }

    #[test]
    fn test_empty_access_token_is_ignored() {
        let parsed = parse_redirect("roadwatch://auth/callback#access_token=&refresh_token=rt");
        assert_eq!(parsed, AuthRedirect::NoAuthData);
    }

    #[test]
    fn test_percent_encoded_values_are_decoded() {
        let parsed = parse_redirect("roadwatch://auth/callback?code=a%2Bb");
        assert_eq!(parsed, AuthRedirect::AuthCode("a+b".to_string()));
    }
}
