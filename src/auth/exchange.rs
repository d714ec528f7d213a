//! Authorization code to bearer token exchange.
//!
//! `OAuthExchangeService` keeps at most one exchange in flight. Starting a
//! new exchange cancels the previous one, whose callback still fires, with
//! `AuthError::RequestCancelled`. Network work runs on a tokio task and the
//! outcome is posted back to the main context, where the token is persisted
//! and the callback invoked exactly once.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::Method;
use serde::Deserialize;
use tokio::sync::oneshot;
use url::Url;

use super::transport::{ExchangeRequest, HttpResponse, Transport, TransportError};
use super::{AccessToken, AuthConfig, AuthError, TokenStore};
use crate::context::ContextHandle;

const GRANT_TYPE: &str = "authorization_code";

/// Success body of the token endpoint. Only `access_token` is kept; the
/// other fields must be present but are discarded.
#[derive(Debug, Deserialize)]
struct TokenResponseBody {
    #[serde(alias = "accessToken")]
    access_token: String,
    #[serde(alias = "tokenType")]
    token_type: String,
    scope: String,
    #[serde(alias = "createdAt")]
    created_at: i64,
}

/// Handle of the outstanding exchange.
struct InFlight {
    id: u64,
    cancel: oneshot::Sender<()>,
}

type Slot = Arc<Mutex<Option<InFlight>>>;

/// Exchanges authorization codes for bearer tokens, one at a time.
pub struct OAuthExchangeService<T: Transport> {
    config: AuthConfig,
    transport: Arc<T>,
    store: TokenStore,
    main: ContextHandle,
    // Only read or written on the main context; the mutex just makes the
    // slot shareable with jobs posted from network tasks.
    in_flight: Slot,
    next_id: AtomicU64,
}

impl<T: Transport> OAuthExchangeService<T> {
    pub fn new(
        config: AuthConfig,
        transport: Arc<T>,
        store: TokenStore,
        main: ContextHandle,
    ) -> Self {
        Self {
            config,
            transport,
            store,
            main,
            in_flight: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    /// Exchange `code` for a bearer token.
    ///
    /// Must be called on the main context, inside a tokio runtime. Returns
    /// immediately; `callback` runs exactly once on the main context. When
    /// the request cannot be built, `callback` runs before this returns.
    pub fn exchange<F>(&self, code: &str, callback: F)
    where
        F: FnOnce(Result<AccessToken, AuthError>) + Send + 'static,
    {
        debug_assert!(
            self.main.is_current(),
            "OAuthExchangeService::exchange called off the main context"
        );

        if let Some(previous) = lock(&self.in_flight).take() {
            tracing::info!("Superseding in-flight token exchange #{}", previous.id);
            let _ = previous.cancel.send(());
        }

        let request = match build_request(&self.config, code) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Token request not sent: {}", e);
                callback(Err(e));
                return;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        *lock(&self.in_flight) = Some(InFlight {
            id,
            cancel: cancel_tx,
        });

        tracing::debug!("Token exchange #{}: POST {}", id, redact(&request.url));

        let transport = Arc::clone(&self.transport);
        let in_flight = Arc::clone(&self.in_flight);
        let store = self.store.clone();
        let main = self.main.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel_rx => Err(TransportError::Cancelled),
                r = transport.send(request) => r,
            };
            let result = classify(outcome);
            main.post(move || deliver(id, result, &in_flight, &store, callback));
        });
    }

    /// Future form of [`exchange`](Self::exchange).
    ///
    /// The request is issued before this returns. The future only resolves
    /// once the main context has run the delivery, so the caller must keep
    /// draining it (see `MainContext::run_until`).
    pub fn exchange_async(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<AccessToken, AuthError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.exchange(code, move |result| {
            let _ = tx.send(result);
        });
        async move { rx.await.unwrap_or(Err(AuthError::RequestCancelled)) }
    }

    /// True while an exchange is outstanding.
    pub fn is_in_flight(&self) -> bool {
        lock(&self.in_flight).is_some()
    }
}

fn lock(slot: &Mutex<Option<InFlight>>) -> MutexGuard<'_, Option<InFlight>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs on the main context: persist on success, clear the handle, then
/// hand the result to the caller.
fn deliver<F>(
    id: u64,
    result: Result<AccessToken, AuthError>,
    in_flight: &Mutex<Option<InFlight>>,
    store: &TokenStore,
    callback: F,
) where
    F: FnOnce(Result<AccessToken, AuthError>),
{
    let current = {
        let mut slot = lock(in_flight);
        if slot.as_ref().map(|f| f.id) == Some(id) {
            *slot = None;
            true
        } else {
            false
        }
    };

    let result = if !current {
        // A newer exchange started after this one finished on the network.
        tracing::debug!("Token exchange #{} superseded before delivery", id);
        Err(AuthError::RequestCancelled)
    } else {
        match result {
            Ok(token) => {
                store.set(&token);
                tracing::info!("Token exchange #{} succeeded, bearer token stored", id);
                Ok(token)
            }
            Err(AuthError::RequestCancelled) => Err(AuthError::RequestCancelled),
            Err(e) => {
                tracing::warn!("Token exchange #{} failed: {}", id, e);
                Err(e)
            }
        }
    };

    callback(result);
}

/// Build the token request for `code`.
fn build_request(config: &AuthConfig, code: &str) -> Result<ExchangeRequest, AuthError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(AuthError::InvalidRequest);
    }

    let mut url = Url::parse(&config.token_url).map_err(|_| AuthError::InvalidRequest)?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(AuthError::InvalidRequest);
    }

    url.query_pairs_mut()
        .clear()
        .append_pair("client_id", &config.client_id)
        .append_pair("client_secret", &config.client_secret)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("code", code)
        .append_pair("grant_type", GRANT_TYPE);

    Ok(ExchangeRequest {
        method: Method::POST,
        url,
    })
}

/// Map a transport outcome to the exchange result.
fn classify(outcome: Result<HttpResponse, TransportError>) -> Result<AccessToken, AuthError> {
    let resp = match outcome {
        Ok(resp) => resp,
        Err(TransportError::Cancelled) => return Err(AuthError::RequestCancelled),
        Err(TransportError::Network(e)) => return Err(AuthError::Transport(e)),
        Err(TransportError::MalformedResponse(detail)) => {
            tracing::debug!("Malformed token response: {}", detail);
            return Err(AuthError::InvalidResponse);
        }
    };

    if !(200..300).contains(&resp.status) {
        return Err(AuthError::from_status(resp.status));
    }

    let body = resp
        .body
        .filter(|b| !b.is_empty())
        .ok_or(AuthError::NoData)?;

    let payload: TokenResponseBody =
        serde_json::from_slice(&body).map_err(|_| AuthError::TokenDecodingFailed)?;

    tracing::debug!(
        "Token issued: type={}, scope={}, created_at={}",
        payload.token_type,
        payload.scope,
        payload.created_at
    );

    Ok(AccessToken::new(payload.access_token))
}

/// Token URL with credentials masked, for logs.
fn redact(url: &Url) -> String {
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = match &*k {
                "client_secret" | "code" => "***".to_string(),
                _ => v.into_owned(),
            };
            (k.into_owned(), v)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
