//! Authentication module for the ImageFeed photo client
//!
//! Exchanges an OAuth2 authorization code for a bearer token and keeps
//! that token in a durable single-slot store.

mod error;
pub mod exchange;
pub mod oauth;
pub mod tokens;
pub mod transport;

pub use error::AuthError;
pub use exchange::OAuthExchangeService;
pub use oauth::{login, logout, print_authorize_url, status};
pub use tokens::{AccessToken, TokenStore};
pub use transport::ReqwestTransport;

use anyhow::{Context, Result};
use url::Url;

/// Path the consent page redirects to when no app redirect is available.
const NATIVE_REDIRECT_PATH: &str = "/oauth/authorize/native";

/// OAuth2 client registration, fixed for the life of the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// OAuth2 client ID (access key)
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// OAuth2 redirect URI
    pub redirect_uri: String,
    /// Token endpoint
    pub token_url: String,
    /// Consent page
    pub authorize_url: String,
    /// Requested scopes, `+`-separated
    pub scope: String,
}

impl AuthConfig {
    /// Consent page URL the user opens to obtain an authorization code.
    pub fn authorize_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.authorize_url)
            .with_context(|| format!("Invalid authorize_url {}", self.authorize_url))?;
        // Form encoding turns the spaces back into `+` separators.
        let scope = self.scope.replace('+', " ");
        url.query_pairs_mut()
            .clear()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scope);
        Ok(url)
    }

    /// Authorization code from user input: either the bare code, or the
    /// full URL the consent page redirected to.
    pub fn code_from_input(&self, input: &str) -> Option<String> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let url = match Url::parse(input) {
            Ok(url) => url,
            Err(_) if !input.contains(char::is_whitespace) => return Some(input.to_string()),
            Err(_) => return None,
        };

        if !self.is_redirect(&url) {
            tracing::debug!("Ignoring URL that is not an authorization redirect");
            return None;
        }

        url.query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .filter(|code| !code.is_empty())
    }

    fn is_redirect(&self, url: &Url) -> bool {
        if url.path() == NATIVE_REDIRECT_PATH {
            return true;
        }
        match Url::parse(&self.redirect_uri) {
            Ok(redirect) => {
                redirect.scheme() == url.scheme()
                    && redirect.host_str() == url.host_str()
                    && redirect.port() == url.port()
                    && redirect.path() == url.path()
            }
            Err(_) => false,
        }
    }
}

/// What the rest of the app sees of the login state.
#[derive(Clone)]
pub struct Session {
    store: TokenStore,
}

impl Session {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    /// Token to send with API requests.
    pub fn bearer_token(&self) -> Option<AccessToken> {
        self.store.get()
    }

    pub fn logout(&self) {
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use std::sync::Arc;

    fn config() -> AuthConfig {
        AuthConfig {
            client_id: "key".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "imagefeed://auth/callback".to_string(),
            token_url: "https://unsplash.com/oauth/token".to_string(),
            authorize_url: "https://unsplash.com/oauth/authorize".to_string(),
            scope: "public+read_user+write_likes".to_string(),
        }
    }

    #[test]
    fn test_authorize_url() {
        let url = config().authorize_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://unsplash.com/oauth/authorize?client_id=key\
             &redirect_uri=imagefeed%3A%2F%2Fauth%2Fcallback&response_type=code\
             &scope=public+read_user+write_likes"
        );
    }

    #[test]
    fn test_code_from_bare_input() {
        assert_eq!(config().code_from_input(" abc123\n").as_deref(), Some("abc123"));
        assert_eq!(config().code_from_input("   "), None);
        assert_eq!(config().code_from_input("two words"), None);
    }

    #[test]
    fn test_code_from_redirect_urls() {
        let config = config();
        assert_eq!(
            config
                .code_from_input("https://unsplash.com/oauth/authorize/native?code=xyz")
                .as_deref(),
            Some("xyz")
        );
        assert_eq!(
            config
                .code_from_input("imagefeed://auth/callback?state=1&code=c0de")
                .as_deref(),
            Some("c0de")
        );
        assert_eq!(
            config.code_from_input("https://unsplash.com/photos?code=xyz"),
            None
        );
        assert_eq!(
            config.code_from_input("imagefeed://auth/callback?error=access_denied"),
            None
        );
    }

    #[test]
    fn test_session_reflects_store() {
        let store = TokenStore::new(Arc::new(MemoryStore::new()));
        let session = Session::new(store.clone());
        assert!(!session.is_authenticated());

        store.set(&AccessToken::new("tok"));
        assert!(session.is_authenticated());
        assert_eq!(session.bearer_token(), Some(AccessToken::new("tok")));

        session.logout();
        assert!(!session.is_authenticated());
        session.logout();
        assert_eq!(store.get(), None);
    }
}
