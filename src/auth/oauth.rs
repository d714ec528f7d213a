//! Login, logout and status commands

use std::sync::Arc;

use anyhow::{Context, Result};

use super::{OAuthExchangeService, ReqwestTransport, Session, TokenStore};
use crate::config::Config;
use crate::context::MainContext;

/// Print the consent page URL that issues authorization codes
pub fn print_authorize_url(config: &Config) -> Result<()> {
    let auth_config = config.auth_config()?;
    let url = auth_config.authorize_url()?;

    println!();
    println!("To sign in, visit: {}", url);
    println!("Then run:          imagefeed-auth login --code <CODE or redirect URL>");
    println!();
    Ok(())
}

/// Exchange an authorization code (or the redirect URL carrying one) for a
/// bearer token and store it.
pub async fn login(
    config: &Config,
    store: TokenStore,
    main: &mut MainContext,
    input: &str,
) -> Result<()> {
    let auth_config = config.auth_config()?;
    let code = auth_config
        .code_from_input(input)
        .context("No authorization code found in input")?;

    if Session::new(store.clone()).is_authenticated() {
        tracing::info!("Existing bearer token will be replaced on success");
    }

    let service = OAuthExchangeService::new(
        auth_config,
        Arc::new(ReqwestTransport::new()),
        store,
        main.handle(),
    );

    tracing::info!("Exchanging authorization code for access token...");
    let pending = service.exchange_async(&code);
    let result = main.run_until(pending).await;
    debug_assert!(!service.is_in_flight());

    match result {
        Ok(_) => {
            println!("Login successful.");
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            tracing::debug!("Token exchange superseded");
            Ok(())
        }
        Err(e) => Err(e).context("Login failed"),
    }
}

/// Clear stored credentials
pub fn logout(session: &Session) {
    session.logout();
    println!("Logged out.");
}

/// Display current auth status
pub fn status(session: &Session) {
    match session.bearer_token() {
        Some(token) => println!("Bearer token: present ({} chars)", token.secret().len()),
        None => {
            println!("Bearer token: none");
            println!("\nRun 'imagefeed-auth authorize-url' to authenticate.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccessToken;
    use crate::config::MemoryStore;
    use mockito::{Matcher, Server};

    fn settings(token_url: String) -> Config {
        Config {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            redirect_uri: Some("urn:ietf:wg:oauth:2.0:oob".to_string()),
            token_url: Some(token_url),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_login_with_redirect_url_stores_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .match_query(Matcher::UrlEncoded("code".into(), "abc123".into()))
            .with_status(200)
            .with_body(
                r#"{"access_token":"tok_9","token_type":"bearer","scope":"public","created_at":1000}"#,
            )
            .create_async()
            .await;

        let store = TokenStore::new(Arc::new(MemoryStore::new()));
        let mut main = MainContext::new();
        login(
            &settings(format!("{}/oauth/token", server.url())),
            store.clone(),
            &mut main,
            "https://unsplash.com/oauth/authorize/native?code=abc123",
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(store.get(), Some(AccessToken::new("tok_9")));
    }

    #[tokio::test]
    async fn test_login_failure_is_reported() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let store = TokenStore::new(Arc::new(MemoryStore::new()));
        let mut main = MainContext::new();
        let err = login(
            &settings(format!("{}/oauth/token", server.url())),
            store.clone(),
            &mut main,
            "abc123",
        )
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("authorization server error"));
        assert_eq!(store.get(), None);
    }

    #[tokio::test]
    async fn test_login_requires_client_settings() {
        let store = TokenStore::new(Arc::new(MemoryStore::new()));
        let mut main = MainContext::new();
        let err = login(&Config::default(), store, &mut main, "abc123")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }
}
