//! Error taxonomy for the authorization code exchange

use thiserror::Error;

/// Terminal outcome of a failed exchange. Every variant is delivered to the
/// caller's callback; none is retried.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The request could not be built, or the server answered 400.
    #[error("invalid token request")]
    InvalidRequest,
    /// The transport returned something that is not an HTTP response.
    #[error("invalid response from authorization server")]
    InvalidResponse,
    /// 2xx status with an empty body.
    #[error("authorization server returned no data")]
    NoData,
    /// Superseded by a newer exchange.
    #[error("token request cancelled")]
    RequestCancelled,
    /// Body present but not a token response.
    #[error("failed to decode token response")]
    TokenDecodingFailed,
    #[error("unauthorized (HTTP 401)")]
    Unauthorized,
    #[error("forbidden (HTTP 403)")]
    Forbidden,
    #[error("token endpoint not found (HTTP 404)")]
    NotFound,
    #[error("authorization server error")]
    ServerError,
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatusCode(u16),
    /// Network-layer failure, passed through unchanged.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl AuthError {
    /// Map a non-2xx status code to its error kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            500..=599 => Self::ServerError,
            other => Self::UnexpectedStatusCode(other),
        }
    }

    /// Whether a UI should stay silent about this failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::RequestCancelled)
    }
}
