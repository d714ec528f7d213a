//! HTTP transport used by the code exchange

use std::future::Future;

use reqwest::header::CONTENT_LENGTH;
use reqwest::Method;
use thiserror::Error;
use url::Url;

/// Largest token response body accepted.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Token exchange request. Every parameter travels in the query string;
/// there is no body.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub method: Method,
    pub url: Url,
}

/// Raw HTTP outcome handed back to the exchange service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// `None` when the server sent no (or an empty) body.
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The request was dropped before it completed.
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Network(#[from] reqwest::Error),
    /// The peer answered with something that is not a usable HTTP response.
    #[error("malformed HTTP response: {0}")]
    MalformedResponse(String),
}

/// Issues exchange requests. Dropping the returned future must abort the
/// request.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: ExchangeRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// Transport over a shared reqwest client.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: ExchangeRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        let http = self.http.clone();
        async move {
            let mut resp = http
                .request(request.method, request.url)
                .header(CONTENT_LENGTH, "0")
                .send()
                .await?;

            let status = resp.status().as_u16();
            if !(100..=599).contains(&status) {
                return Err(TransportError::MalformedResponse(format!(
                    "status line {}",
                    status
                )));
            }

            if let Some(len) = resp.content_length() {
                if len > MAX_BODY_BYTES as u64 {
                    return Err(TransportError::MalformedResponse(format!(
                        "body of {} bytes exceeds {} byte limit",
                        len, MAX_BODY_BYTES
                    )));
                }
            }

            // Content-Length may be absent (chunked), so also cap while reading.
            let mut body = Vec::new();
            while let Some(chunk) = resp
                .chunk()
                .await
                .map_err(|e| TransportError::MalformedResponse(e.to_string()))?
            {
                if body.len() + chunk.len() > MAX_BODY_BYTES {
                    return Err(TransportError::MalformedResponse(format!(
                        "body exceeds {} byte limit",
                        MAX_BODY_BYTES
                    )));
                }
                body.extend_from_slice(&chunk);
            }

            Ok(HttpResponse {
                status,
                body: (!body.is_empty()).then_some(body),
            })
        }
    }
}
